use bytes::BytesMut;
use chainkey_bus::BusPort;
use tracing::trace;

use crate::codec::{encode_frame, OVERHEAD};
use crate::error::Result;
use crate::message::Message;

/// Serialize one message and transmit it as a single frame.
pub fn send_message<P: BusPort>(port: &mut P, message: &Message) -> Result<()> {
    let mut payload = BytesMut::with_capacity(8);
    message.encode_payload(&mut payload);
    send_frame(port, message.msg_type(), &payload)
}

/// Transmit one raw frame.
///
/// Transmit enable is asserted before the first byte and released after the
/// last, whatever the write outcome. The line must be handed back promptly
/// so other boards can speak.
pub fn send_frame<P: BusPort>(port: &mut P, msg_type: u8, payload: &[u8]) -> Result<()> {
    let mut wire = BytesMut::with_capacity(OVERHEAD + payload.len());
    encode_frame(msg_type, payload, &mut wire)?;

    port.set_transmit_enable(true)?;
    let written = port.write_all(&wire);
    let released = port.set_transmit_enable(false);
    written?;
    released?;

    trace!(msg_type, len = payload.len(), "frame transmitted");
    Ok(())
}
