//! Transport channels carrying emulator protocol envelopes.
//!
//! A channel is a duplex byte stream to one or more remote peers. It owns
//! framing: every envelope travels as a `[len:4 BE][envelope]` frame. Inbound
//! envelopes are handed to an [`InboundHandler`] and its reply goes back to the
//! peer that sent the envelope; [`TransportChannel::send`] pushes an
//! unsolicited message to every connected peer.
//!
//! # Implementations
//!
//! - [`socket::SocketChannel`] – TCP listener on the tokio runtime; the host
//!   tooling connects here.
//! - [`pipe::PipeChannel`] – character device or FIFO served by a dedicated
//!   reader thread and a writer thread; only present in a virtualized guest.
//! - [`mock::RecordingChannel`] – test double that records what it sends.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;
use vhal_core::protocol::frame::{bare_frame, encode_frame, FrameError};
use vhal_core::{encode_message, EmulatorMessage, ProtocolError, ResponseStatus};

pub mod mock;
pub mod pipe;
pub mod socket;

/// Error type for transport channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The pipe device could not be opened.
    #[error("failed to open pipe device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),

    /// A peer's outbound queue is full; the message was dropped for that peer.
    #[error("outbound queue full for peer {0}")]
    Backpressure(String),

    /// The peer's writer has shut down after a write failure.
    #[error("peer connection closed")]
    Closed,

    #[error("channel is not started")]
    NotStarted,

    #[error("channel is already started")]
    AlreadyStarted,
}

/// Receives envelopes arriving on a channel.
///
/// Implementations must always produce a reply: every inbound envelope is
/// answered exactly once, even when it cannot be decoded.
pub trait InboundHandler: Send + Sync {
    /// Handles one raw envelope (framing already removed) and returns the reply.
    fn on_envelope(&self, envelope: &[u8]) -> EmulatorMessage;
}

/// A duplex protocol channel.
pub trait TransportChannel: Send + Sync {
    /// Short name used in log output (`"socket"`, `"pipe"`).
    fn name(&self) -> &str;

    /// Begins accepting peers and delivering inbound envelopes to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the underlying endpoint cannot be opened.
    fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<(), ChannelError>;

    /// Stops the channel and releases its handler. In-flight sends may be
    /// dropped. Stopping a channel that never started is a no-op.
    fn stop(&self);

    /// Sends `message` to every connected peer without blocking.
    ///
    /// A channel with no connected peer accepts the message and drops it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the message could not be queued for at
    /// least one peer. Other peers still receive it.
    fn send(&self, message: &EmulatorMessage) -> Result<(), ChannelError>;
}

/// Encodes `message` and wraps it in a length-prefixed frame.
///
/// # Errors
///
/// Returns [`ChannelError::Encode`] or [`ChannelError::Frame`] on failure.
pub fn frame_message(message: &EmulatorMessage) -> Result<Vec<u8>, ChannelError> {
    let envelope = encode_message(message)?;
    Ok(encode_frame(&envelope)?)
}

/// Status sent in place of a reply that cannot be framed.
pub const UNFRAMEABLE_REPLY_STATUS: ResponseStatus = ResponseStatus::Unknown;

/// Frames the reply to an inbound envelope.
///
/// A reply that cannot be encoded or exceeds the frame limit is replaced by a
/// payload-free envelope of the same kind carrying
/// [`UNFRAMEABLE_REPLY_STATUS`], so the peer still gets exactly one answer.
pub fn frame_reply(reply: &EmulatorMessage) -> Vec<u8> {
    match frame_message(reply) {
        Ok(frame) => frame,
        Err(e) => {
            error!("cannot frame {:?} reply, sending bare status: {e}", reply.message_type);
            bare_frame(reply.message_type, UNFRAMEABLE_REPLY_STATUS)
        }
    }
}

/// The channels owned by one protocol server.
///
/// The socket channel is absent when disabled in configuration; the pipe
/// channel exists only in a virtualized guest.
#[derive(Default, Clone)]
pub struct ChannelSet {
    pub socket: Option<Arc<dyn TransportChannel>>,
    pub pipe: Option<Arc<dyn TransportChannel>>,
}

impl ChannelSet {
    pub fn new(
        socket: Option<Arc<dyn TransportChannel>>,
        pipe: Option<Arc<dyn TransportChannel>>,
    ) -> Self {
        Self { socket, pipe }
    }

    /// Present channels in start order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn TransportChannel>> {
        self.socket.iter().chain(self.pipe.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.socket.is_none() && self.pipe.is_none()
    }
}
