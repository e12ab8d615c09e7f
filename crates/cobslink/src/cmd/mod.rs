use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use cobslink_channel::Channel;
use cobslink_frame::command::ECHO;
use cobslink_frame::Message;
use cobslink_transport::DEFAULT_BAUD_RATE;

use crate::exit::{CliError, CliResult, INTERNAL, TIMEOUT, TRANSPORT_ERROR, USAGE};
use crate::link::AnyLink;
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message to the controller.
    Send(SendArgs),
    /// Print messages received from the controller.
    Listen(ListenArgs),
    /// Measure one echo round trip.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct LinkTarget {
    /// Serial port of the controller (e.g. /dev/ttyACM0, COM3).
    #[arg(long, short = 'p', env = "COBSLINK_PORT")]
    pub port: Option<String>,
    /// Unix socket of a device simulator.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    #[command(flatten)]
    pub target: LinkTarget,
    /// Serial line speed.
    #[arg(long, short = 'b', default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Bound on a single blocking link read (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub read_timeout: String,
    /// How long a serial write may wait for the controller's CTS (e.g. 1s).
    #[arg(long, default_value = "1s")]
    pub write_timeout: String,
}

impl LinkArgs {
    pub fn read_timeout(&self) -> CliResult<Duration> {
        parse_duration(&self.read_timeout)
    }

    pub fn write_timeout(&self) -> CliResult<Duration> {
        parse_duration(&self.write_timeout)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Packed message as hex (header, length and payload; checksum is appended).
    #[arg(conflicts_with_all = ["id", "command", "data"])]
    pub hex: Option<String>,
    /// Message identifier (0-2047).
    #[arg(long, default_value_t = 1)]
    pub id: u16,
    /// Command value (0-31).
    #[arg(long, short = 'c', default_value_t = ECHO)]
    pub command: u8,
    /// Payload as hex.
    #[arg(long)]
    pub data: Option<String>,
    /// Wait for one message from the controller and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Only print these commands (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub commands: Option<Vec<u8>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print channel counters on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Message identifier to echo.
    #[arg(long, default_value_t = 1)]
    pub id: u16,
    /// Echo payload as hex.
    #[arg(long, default_value = "010203")]
    pub data: String,
    /// Maximum time to wait for the reply (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
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

pub fn parse_hex(flag: &str, text: &str) -> CliResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|err| CliError::new(USAGE, format!("{flag} is not valid hex: {err}")))
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Forward every received message into a queue the command thread can wait on.
pub fn subscribe(channel: &Channel<AnyLink>) -> Receiver<Message> {
    let (tx, rx) = mpsc::channel();
    channel.on_message(move |message: &Message| {
        let _ = tx.send(message.clone());
    });
    rx
}

/// Block until a message satisfying `accept` arrives, the link fails, or
/// `timeout` elapses.
pub fn wait_for(
    rx: &Receiver<Message>,
    channel: &Channel<AnyLink>,
    timeout: Duration,
    accept: impl Fn(&Message) -> bool,
) -> CliResult<Message> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply within {}ms", timeout.as_millis()),
            ));
        }
        match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(message) if accept(&message) => return Ok(message),
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(INTERNAL, "message handler was dropped"));
            }
        }
        if !channel.is_open() {
            return Err(link_lost(channel));
        }
    }
}

pub fn link_lost(channel: &Channel<AnyLink>) -> CliError {
    let reason = channel
        .last_error()
        .unwrap_or_else(|| "channel closed".to_string());
    CliError::new(
        TRANSPORT_ERROR,
        format!("{}: {reason}", channel.link_name()),
    )
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_hex_ignores_whitespace() {
        assert_eq!(parse_hex("--data", "01 02\t03").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_hex("--data", "").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parse_hex_rejects_odd_digits() {
        let err = parse_hex("--data", "abc").unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("--data"));
    }
}
