use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chainkey_bus::{ChainBoard, SystemClock, VirtualChain};
use chainkey_frame::NodeId;
use chainkey_link::{LinkConfig, LinkError, NetworkStatus, Node, NoteEvent, REGISTRY_CAPACITY};
use tracing::info;

use crate::cmd::SimArgs;
use crate::exit::{link_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_discovery, print_note, print_topology, OutputFormat};

const ARPEGGIO: [u8; 4] = [0, 4, 7, 12];

enum SimEvent {
    Discovered {
        slot: usize,
        identity: NodeId,
        status: NetworkStatus,
    },
    Note {
        slot: usize,
        event: NoteEvent,
    },
}

pub fn run(args: SimArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = parse_duration(&args.duration)?;
    let note_interval = parse_duration(&args.note_interval)?;
    let attach_after = args
        .attach_after
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    if args.boards == 0 || args.boards > REGISTRY_CAPACITY {
        return Err(CliError::new(
            USAGE,
            format!("boards must be 1-{REGISTRY_CAPACITY}, got {}", args.boards),
        ));
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let deadline = Instant::now() + duration;
    let mut chain = VirtualChain::new(args.boards);
    let (tx, rx) = mpsc::channel::<SimEvent>();

    let mut handles = Vec::new();
    for slot in 0..args.boards {
        let board = chain
            .board(slot)
            .ok_or_else(|| CliError::new(INTERNAL, format!("slot {slot} unavailable")))?;
        handles.push(spawn_board(
            slot,
            board,
            tx.clone(),
            running.clone(),
            deadline,
            note_interval,
            args.silent,
        ));
    }

    if let Some(delay) = attach_after {
        let tx = tx.clone();
        let running = running.clone();
        let board = chain.attach_right();
        let slot = chain.len() - 1;
        let silent = args.silent;
        handles.push(thread::spawn(move || {
            // The new board powers up mid-run, exactly like plugging a
            // module onto the right end of a live instrument.
            thread::sleep(delay);
            if !running.load(Ordering::SeqCst) {
                return Ok(());
            }
            info!(slot, "attaching new board");
            board_main(slot, board, tx, running, deadline, note_interval, silent)
        }));
    }
    drop(tx);

    let mut latest: BTreeMap<usize, (NodeId, NetworkStatus)> = BTreeMap::new();
    for event in rx {
        match event {
            SimEvent::Discovered {
                slot,
                identity,
                status,
            } => {
                print_discovery(slot, identity, &status, format);
                latest.insert(slot, (identity, status));
            }
            SimEvent::Note { slot, event } => print_note(slot, &event, format),
        }
    }

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(link_error("board failed", err)),
            Err(_) => return Err(CliError::new(FAILURE, "board thread panicked")),
        }
    }

    let rows: Vec<(usize, NodeId, NetworkStatus)> = latest
        .iter()
        .map(|(slot, (identity, status))| (*slot, *identity, *status))
        .collect();
    print_topology(&rows, format);

    Ok(SUCCESS)
}

fn spawn_board(
    slot: usize,
    board: ChainBoard,
    tx: mpsc::Sender<SimEvent>,
    running: Arc<AtomicBool>,
    deadline: Instant,
    note_interval: Duration,
    silent: bool,
) -> thread::JoinHandle<Result<(), LinkError>> {
    thread::spawn(move || board_main(slot, board, tx, running, deadline, note_interval, silent))
}

fn board_main(
    slot: usize,
    board: ChainBoard,
    tx: mpsc::Sender<SimEvent>,
    running: Arc<AtomicBool>,
    deadline: Instant,
    note_interval: Duration,
    silent: bool,
) -> Result<(), LinkError> {
    let mut node = Node::new(board.port, board.sense, SystemClock, LinkConfig::default());
    node.run_discovery()?;
    let _ = tx.send(SimEvent::Discovered {
        slot,
        identity: node.identity(),
        status: node.status(),
    });

    let mut last_status = node.status();
    // Stagger the demo notes a little per board so they interleave.
    let mut next_note = Instant::now() + note_interval + Duration::from_millis(slot as u64 * 37);
    let mut step = 0usize;
    let mut held: Option<u8> = None;

    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        for event in node.poll()? {
            let _ = tx.send(SimEvent::Note { slot, event });
        }

        let status = node.status();
        if status != last_status {
            let _ = tx.send(SimEvent::Discovered {
                slot,
                identity: node.identity(),
                status,
            });
            last_status = status;
        }

        if !silent && Instant::now() >= next_note {
            if let Some(note) = held.take() {
                let _ = node.note_off(note);
            }
            let note = node
                .base_note()
                .saturating_add(ARPEGGIO[step % ARPEGGIO.len()]);
            let _ = node.note_on(note, 96);
            held = Some(note);
            step += 1;
            next_note += note_interval;
        }

        thread::sleep(Duration::from_millis(2));
    }

    if let Some(note) = held.take() {
        let _ = node.note_off(note);
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
