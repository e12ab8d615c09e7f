use std::time::Instant;

use cobslink_frame::command::ECHO;

use crate::cmd::{parse_duration, parse_hex, subscribe, wait_for, EchoArgs};
use crate::exit::{channel_error, CliResult, FAILURE, SUCCESS};
use crate::link::open_channel;
use crate::output::{print_echo, EchoReport, OutputFormat};

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = parse_hex("--data", &args.data)?;

    let channel = open_channel(&args.link)?;
    let rx = subscribe(&channel);

    let started = Instant::now();
    channel
        .write(args.id, ECHO, payload.clone())
        .map_err(|err| channel_error("send failed", err))?;
    let reply = wait_for(&rx, &channel, timeout, |message| {
        message.command() == ECHO && message.id() == args.id
    })?;
    let latency = started.elapsed();

    let report = EchoReport {
        id: reply.id(),
        sent: hex::encode(&payload),
        received: hex::encode(reply.payload()),
        matched: reply.payload().as_ref() == payload.as_slice(),
        latency_us: latency.as_micros(),
    };
    print_echo(&report, format);

    channel.close();
    Ok(if report.matched { SUCCESS } else { FAILURE })
}
