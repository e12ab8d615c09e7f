use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cmd::{install_ctrlc_handler, link_lost, subscribe, ListenArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::link::open_channel;
use crate::output::{print_message, print_stats, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = open_channel(&args.link)?;
    let rx = subscribe(&channel);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(link = %channel.link_name(), "listening");

    let mut printed = 0usize;
    let mut outcome = Ok(SUCCESS);

    while running.load(Ordering::SeqCst) {
        let message = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => {
                if !channel.is_open() {
                    outcome = Err(link_lost(&channel));
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(commands) = &args.commands {
            if !commands.contains(&message.command()) {
                continue;
            }
        }

        print_message(&message, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    if args.stats {
        print_stats(channel.link_name(), &channel.stats(), format);
    }
    channel.close();
    outcome
}
