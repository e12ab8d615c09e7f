use tracing::debug;

use crate::cmd::{parse_duration, parse_hex, subscribe, wait_for, SendArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::link::open_channel;
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = match &args.data {
        Some(text) => parse_hex("--data", text)?,
        None => Vec::new(),
    };

    let channel = open_channel(&args.link)?;
    // Subscribe before writing so a fast reply is not missed.
    let replies = args.wait.then(|| subscribe(&channel));

    let sent = match &args.hex {
        Some(text) => channel.send_hex(text),
        None => channel.write(args.id, args.command, payload),
    };
    sent.map_err(|err| channel_error("send failed", err))?;

    debug!(link = %channel.link_name(), "message sent");

    if let Some(rx) = replies {
        let reply = wait_for(&rx, &channel, wait_timeout, |_| true)?;
        print_message(&reply, format);
    }

    channel.close();
    Ok(SUCCESS)
}
