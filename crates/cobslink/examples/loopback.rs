//! Channel against an in-process simulated controller.
//!
//! The device side echoes every message back and then emits one keypad event.
//!
//! Run with:
//!   cargo run -p cobslink --example loopback

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use cobslink::channel::{Channel, ChannelConfig};
    use cobslink::frame::command::{ECHO, KEYPAD};
    use cobslink::frame::{command_name, FrameReader, FrameWriter, Message};
    use cobslink::transport::SocketLink;

    let (link, remote) = SocketLink::pair()?;
    let device_in = remote.try_clone()?;

    thread::spawn(move || {
        let mut reader = FrameReader::new(device_in);
        let mut writer = FrameWriter::new(remote);
        while let Ok(msg) = reader.read_message() {
            if writer.send(&msg).is_err() {
                break;
            }
            if let Ok(key) = Message::new(msg.id(), KEYPAD, vec![0b0010_1011]) {
                let _ = writer.send(&key);
            }
        }
    });

    let channel = Channel::open(link, ChannelConfig::default())?;
    let (tx, rx) = mpsc::channel();
    channel.on_message(move |msg: &Message| {
        let _ = tx.send(msg.clone());
    });

    channel.write(1, ECHO, vec![0x01, 0x02, 0x03])?;
    for _ in 0..2 {
        let msg = rx.recv_timeout(Duration::from_secs(2))?;
        eprintln!(
            "received id={} command={} payload={:02x?}",
            msg.id(),
            command_name(msg.command()),
            msg.payload().as_ref()
        );
    }

    eprintln!("{:?}", channel.stats());
    channel.close();
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the loopback example needs unix socket pairs");
}
