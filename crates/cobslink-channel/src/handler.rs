use cobslink_frame::Message;

/// Receives every message the channel decodes, in arrival order.
///
/// Runs on the processor thread. A handler that blocks on link I/O stalls
/// all further dispatch.
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(&Message) + Send,
{
    fn handle(&mut self, message: &Message) {
        self(message)
    }
}
