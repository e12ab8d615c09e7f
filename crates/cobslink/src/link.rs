use std::io::{self, Read, Write};
use std::time::Duration;

use cobslink_channel::{Channel, ChannelConfig};
use cobslink_transport::{FlowControl, Link, SerialConfig, SerialLink};
#[cfg(unix)]
use cobslink_transport::SocketLink;

use crate::cmd::LinkArgs;
use crate::exit::{channel_error, transport_error, CliError, CliResult, USAGE};

/// Whichever link the command line selected.
pub enum AnyLink {
    Serial(SerialLink),
    #[cfg(unix)]
    Socket(SocketLink),
}

macro_rules! delegate {
    ($this:ident, $link:ident => $body:expr) => {
        match $this {
            AnyLink::Serial($link) => $body,
            #[cfg(unix)]
            AnyLink::Socket($link) => $body,
        }
    };
}

impl Read for AnyLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        delegate!(self, link => link.read(buf))
    }
}

impl Write for AnyLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        delegate!(self, link => link.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        delegate!(self, link => link.flush())
    }
}

impl Link for AnyLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> cobslink_transport::Result<()> {
        delegate!(self, link => link.set_read_timeout(timeout))
    }

    fn try_clone(&self) -> cobslink_transport::Result<Self> {
        match self {
            AnyLink::Serial(link) => link.try_clone().map(AnyLink::Serial),
            #[cfg(unix)]
            AnyLink::Socket(link) => link.try_clone().map(AnyLink::Socket),
        }
    }

    fn flow_control(&self) -> cobslink_transport::Result<Box<dyn FlowControl>> {
        delegate!(self, link => link.flow_control())
    }

    fn discard_buffers(&mut self) -> cobslink_transport::Result<()> {
        delegate!(self, link => link.discard_buffers())
    }

    fn describe(&self) -> String {
        delegate!(self, link => link.describe())
    }
}

pub fn open_link(args: &LinkArgs) -> CliResult<AnyLink> {
    if let Some(port) = &args.target.port {
        let config = SerialConfig {
            port: port.clone(),
            baud_rate: args.baud,
            timeout: args.read_timeout()?,
            write_timeout: args.write_timeout()?,
        };
        return SerialLink::open(&config)
            .map(AnyLink::Serial)
            .map_err(|err| transport_error("open failed", err));
    }

    if let Some(path) = &args.target.socket {
        #[cfg(unix)]
        {
            return SocketLink::connect(path)
                .map(AnyLink::Socket)
                .map_err(|err| transport_error("connect failed", err));
        }
        #[cfg(not(unix))]
        {
            return Err(CliError::new(
                USAGE,
                format!(
                    "--socket {} is only supported on unix platforms",
                    path.display()
                ),
            ));
        }
    }

    Err(CliError::new(USAGE, "one of --port or --socket is required"))
}

pub fn open_channel(args: &LinkArgs) -> CliResult<Channel<AnyLink>> {
    let link = open_link(args)?;
    let config = ChannelConfig::default().with_read_timeout(args.read_timeout()?);
    Channel::open(link, config).map_err(|err| channel_error("channel open failed", err))
}
