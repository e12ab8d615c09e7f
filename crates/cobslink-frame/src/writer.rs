use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::warn;

use crate::cobs::TERMINATOR;
use crate::codec::{encode_frame, encode_raw, max_frame_len, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Writes complete frames to any `Write` stream.
///
/// If a write fails after part of a frame reached the stream, the next write
/// starts with a lone terminator so the remote drops the torn frame and
/// stays aligned.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    torn: bool,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.max_frame_len()),
            config,
            torn: false,
        }
    }

    /// Encode and write one message (blocking). Returns the wire byte count.
    pub fn send(&mut self, message: &Message) -> Result<usize> {
        if message.payload().len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: message.payload().len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(message, &mut self.buf);
        self.write_buffered()
    }

    /// Checksum, stuff and write a caller-built header and payload.
    pub fn send_raw(&mut self, layout: &[u8]) -> Result<usize> {
        self.buf.clear();
        encode_raw(layout, &mut self.buf)?;
        self.write_buffered()
    }

    /// Write bytes that are already framed.
    pub fn write_wire(&mut self, wire: &[u8]) -> Result<usize> {
        self.buf.clear();
        self.buf.extend_from_slice(wire);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<usize> {
        let mut written = 0usize;
        if self.torn {
            written += write_fully(&mut self.inner, &[TERMINATOR]).map_err(|(_, err)| err)?;
            self.torn = false;
        }

        match write_fully(&mut self.inner, &self.buf) {
            Ok(n) => written += n,
            Err((sent, err)) => {
                if sent > 0 {
                    warn!(sent, len = self.buf.len(), "frame torn by failed write");
                    self.torn = true;
                }
                return Err(err);
            }
        }

        self.flush()?;
        Ok(written)
    }

    /// Whether the last frame was only partly written.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent messages.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
        self.buf.reserve(max_frame_len(max_payload_size));
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Write all of `bytes`, reporting how many went out before a failure.
fn write_fully<T: Write>(
    inner: &mut T,
    bytes: &[u8],
) -> std::result::Result<usize, (usize, FrameError)> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match inner.write(&bytes[offset..]) {
            Ok(0) => return Err((offset, FrameError::ConnectionClosed)),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err((offset, FrameError::Io(err))),
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;
    use crate::command::{ECHO, KEYPAD};
    use crate::message::DEFAULT_MAX_PAYLOAD;

    fn message(id: u16, command: u8, payload: &[u8]) -> Message {
        Message::new(id, command, payload.to_vec()).unwrap()
    }

    fn split_frames(wire: &[u8]) -> Vec<&[u8]> {
        wire.split(|&b| b == 0).filter(|run| !run.is_empty()).collect()
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let written = writer.send(&message(1, ECHO, &[1, 2, 3])).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(written, wire.len());
        assert_eq!(wire, vec![0x01, 0x07, 0x34, 0x03, 0x01, 0x02, 0x03, 0x37, 0x00]);
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&message(1, ECHO, b"one")).unwrap();
        writer.send(&message(2, ECHO, b"two")).unwrap();
        writer.send(&message(3, KEYPAD, b"three")).unwrap();

        let wire = writer.into_inner().into_inner();
        let frames: Vec<Message> = split_frames(&wire)
            .into_iter()
            .map(|run| decode_frame(run, DEFAULT_MAX_PAYLOAD).unwrap())
            .collect();

        assert_eq!((frames[0].id(), frames[0].payload().as_ref()), (1, b"one".as_ref()));
        assert_eq!((frames[1].id(), frames[1].payload().as_ref()), (2, b"two".as_ref()));
        assert_eq!((frames[2].command(), frames[2].payload().as_ref()), (KEYPAD, b"three".as_ref()));
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(&message(1, ECHO, b"oversized")).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn raw_layout_is_checksummed_and_stuffed() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send_raw(&[0x00, 0x34, 0x03, 0x01, 0x02, 0x03]).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, vec![0x01, 0x07, 0x34, 0x03, 0x01, 0x02, 0x03, 0x37, 0x00]);
    }

    #[test]
    fn wire_bytes_pass_through() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(writer.write_wire(&[0x02, 0xAA, 0x00]).unwrap(), 3);
        assert_eq!(writer.into_inner().into_inner(), vec![0x02, 0xAA, 0x00]);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(&message(1, ECHO, b"x")).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        writer.set_max_payload_size(16);
        assert_eq!(writer.config().max_payload_size, 16);
        let _inner = writer.into_inner();
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(&message(5, ECHO, b"retry")).unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let writer_impl = WouldBlockWriteThenFlush {
            wrote_once: false,
            flush_would_block: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(&message(6, ECHO, b"retry")).unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(&message(1, ECHO, b"x")).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_io_error() {
        let mut writer = FrameWriter::new(BrokenWriter);
        let err = writer.send(&message(1, ECHO, b"x")).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn timed_out_write_terminates_torn_frame_before_the_next() {
        let mut writer = FrameWriter::new(StallingWriter {
            accept_before_stall: Some(3),
            data: Vec::new(),
        });

        let err = writer.send(&message(1, ECHO, &[0x11; 8])).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::TimedOut));
        assert!(writer.is_torn());

        let second = message(2, ECHO, b"ok");
        let written = writer.send(&second).unwrap();
        assert!(!writer.is_torn());

        let mut expected = BytesMut::new();
        crate::codec::encode_frame(&second, &mut expected);
        assert_eq!(written, expected.len() + 1);

        let wire = writer.into_inner().data;
        assert_eq!(wire[3], TERMINATOR);
        assert_eq!(&wire[4..], expected.as_ref());

        let runs = split_frames(&wire);
        assert_eq!(runs.len(), 2);
        assert!(decode_frame(runs[0], DEFAULT_MAX_PAYLOAD).is_err());
        assert_eq!(decode_frame(runs[1], DEFAULT_MAX_PAYLOAD).unwrap().id(), 2);
    }

    #[test]
    fn failure_before_any_byte_leaves_stream_aligned() {
        let mut writer = FrameWriter::new(StallingWriter {
            accept_before_stall: Some(0),
            data: Vec::new(),
        });

        assert!(writer.send(&message(1, ECHO, b"x")).is_err());
        assert!(!writer.is_torn());

        writer.send(&message(2, ECHO, b"y")).unwrap();
        let wire = writer.into_inner().data;
        assert_ne!(wire[0], TERMINATOR);
        assert_eq!(split_frames(&wire).len(), 1);
    }

    /// Accepts a few bytes, then times out once, then accepts everything.
    struct StallingWriter {
        accept_before_stall: Option<usize>,
        data: Vec<u8>,
    }

    impl Write for StallingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.accept_before_stall {
                Some(0) => {
                    self.accept_before_stall = None;
                    Err(std::io::Error::from(ErrorKind::TimedOut))
                }
                Some(n) => {
                    let take = n.min(buf.len());
                    self.accept_before_stall = Some(n - take);
                    self.data.extend_from_slice(&buf[..take]);
                    Ok(take)
                }
                None => {
                    self.data.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct WouldBlockWriteThenFlush {
        wrote_once: bool,
        flush_would_block: bool,
        data: Vec<u8>,
    }

    impl Write for WouldBlockWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_would_block {
                self.flush_would_block = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn written_bytes_decode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&message(3, ECHO, b"z")).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        let msg = framed.read_message().unwrap();
        assert_eq!(msg.id(), 3);
        assert_eq!(msg.payload().as_ref(), b"z");
    }
}
