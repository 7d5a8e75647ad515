//! Recording transport channel for tests.
//!
//! Records every message sent through it and lets tests play the remote peer
//! by delivering raw envelopes to the registered handler.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use vhal_core::{encode_message, EmulatorMessage};

use super::{ChannelError, InboundHandler, TransportChannel};

/// Shared log of `"<name>:start"` / `"<name>:stop"` entries, used to check
/// lifecycle ordering across several channels.
pub type LifecycleLog = Arc<Mutex<Vec<String>>>;

/// A [`TransportChannel`] that records instead of transmitting.
pub struct RecordingChannel {
    name: String,
    sent: Mutex<Vec<EmulatorMessage>>,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,
    started: AtomicBool,
    failing: AtomicBool,
    lifecycle: Option<LifecycleLog>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            started: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            lifecycle: None,
        }
    }

    /// Creates a channel that appends its start/stop events to `log`.
    pub fn with_lifecycle_log(name: &str, log: LifecycleLog) -> Self {
        Self {
            lifecycle: Some(log),
            ..Self::new(name)
        }
    }

    /// Makes every subsequent `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Messages successfully sent so far.
    pub fn sent(&self) -> Vec<EmulatorMessage> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Delivers `message` as if a remote peer had sent it and returns the reply.
    ///
    /// Returns `None` if the channel is not started.
    pub fn deliver(&self, message: &EmulatorMessage) -> Option<EmulatorMessage> {
        let bytes = encode_message(message).expect("test message must encode");
        self.deliver_raw(&bytes)
    }

    /// Delivers raw envelope bytes as if a remote peer had sent them.
    pub fn deliver_raw(&self, envelope: &[u8]) -> Option<EmulatorMessage> {
        let handler = self.handler.lock().expect("lock poisoned").clone()?;
        Some(handler.on_envelope(envelope))
    }

    fn log(&self, event: &str) {
        if let Some(log) = &self.lifecycle {
            log.lock()
                .expect("lock poisoned")
                .push(format!("{}:{event}", self.name));
        }
    }
}

impl TransportChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<(), ChannelError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStarted);
        }
        *self.handler.lock().expect("lock poisoned") = Some(handler);
        self.log("start");
        Ok(())
    }

    fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.log("stop");
        }
        *self.handler.lock().expect("lock poisoned") = None;
    }

    fn send(&self, message: &EmulatorMessage) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated send failure",
            )));
        }
        self.sent.lock().expect("lock poisoned").push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vhal_core::{MessageType, ResponseStatus};

    struct EchoHandler;

    impl InboundHandler for EchoHandler {
        fn on_envelope(&self, envelope: &[u8]) -> EmulatorMessage {
            let kind = vhal_core::protocol::peek_message_type(envelope).unwrap_or_default();
            EmulatorMessage::response_to(kind)
        }
    }

    #[test]
    fn test_recording_channel_records_sent_messages() {
        let channel = RecordingChannel::new("socket");
        let msg = EmulatorMessage::new(MessageType::SetPropertyAsync);

        channel.send(&msg).unwrap();

        assert_eq!(channel.sent(), vec![msg]);
    }

    #[test]
    fn test_failing_channel_records_nothing() {
        let channel = RecordingChannel::new("pipe");
        channel.set_failing(true);

        let result = channel.send(&EmulatorMessage::new(MessageType::SetPropertyAsync));

        assert!(matches!(result, Err(ChannelError::Io(_))));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_deliver_requires_started_channel() {
        // Arrange
        let channel = RecordingChannel::new("socket");
        let cmd = EmulatorMessage::new(MessageType::GetConfigAllCmd);

        // Act / Assert
        assert!(channel.deliver(&cmd).is_none());
        channel.start(Arc::new(EchoHandler)).unwrap();
        let reply = channel.deliver(&cmd).expect("started channel answers");
        assert_eq!(reply.message_type, MessageType::GetConfigAllResp);
        assert_eq!(reply.status, ResponseStatus::Ok);
    }

    #[test]
    fn test_lifecycle_log_records_start_and_stop_once() {
        let log: LifecycleLog = Arc::new(Mutex::new(Vec::new()));
        let channel = RecordingChannel::with_lifecycle_log("socket", Arc::clone(&log));

        channel.start(Arc::new(EchoHandler)).unwrap();
        assert!(matches!(
            channel.start(Arc::new(EchoHandler)),
            Err(ChannelError::AlreadyStarted)
        ));
        channel.stop();
        channel.stop();

        assert_eq!(*log.lock().unwrap(), vec!["socket:start", "socket:stop"]);
    }
}
