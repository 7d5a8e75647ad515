//! TCP socket channel.
//!
//! Host tooling connects to a TCP port and exchanges framed envelopes. The
//! channel runs on the tokio runtime it was created with:
//!
//! ```text
//! accept task
//!  └─ per peer
//!       ├─ reader task   frames → InboundHandler → reply queued on the peer
//!       └─ writer task   drains the peer's bounded queue onto the socket
//! ```
//!
//! Broadcasts use `try_send` on each peer's queue, so [`SocketChannel::send`]
//! never blocks the caller. A peer whose queue is full misses the message.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vhal_core::protocol::frame::{frame_len, FRAME_HEADER_SIZE};
use vhal_core::EmulatorMessage;

use super::{frame_message, frame_reply, ChannelError, InboundHandler, TransportChannel};

/// Frames queued per peer before broadcasts to it start being dropped.
pub const PEER_QUEUE_DEPTH: usize = 64;

/// Default TCP port of the emulator socket.
pub const DEFAULT_PORT: u16 = 33452;

struct Peer {
    outbound: mpsc::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

type PeerMap = Arc<Mutex<HashMap<Uuid, Peer>>>;

#[derive(Default)]
struct ListenerState {
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// TCP implementation of [`TransportChannel`].
pub struct SocketChannel {
    bind_addr: SocketAddr,
    runtime: Handle,
    state: Mutex<ListenerState>,
    peers: PeerMap,
}

impl SocketChannel {
    /// Creates a channel that will listen on `bind_addr` once started.
    ///
    /// All tasks are spawned on `runtime`, so the channel can be started and
    /// fed from threads outside the runtime.
    pub fn new(bind_addr: SocketAddr, runtime: Handle) -> Self {
        Self {
            bind_addr,
            runtime,
            state: Mutex::new(ListenerState::default()),
            peers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The bound address, available after a successful `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.state).local_addr
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }
}

impl TransportChannel for SocketChannel {
    fn name(&self) -> &str {
        "socket"
    }

    fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        if state.accept_task.is_some() {
            return Err(ChannelError::AlreadyStarted);
        }

        // Bind synchronously so a busy port is reported to the caller.
        let addr = self.bind_addr;
        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|source| ChannelError::Bind { addr, source })?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let listener = {
            let _guard = self.runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let peers = Arc::clone(&self.peers);
        state.accept_task = Some(self.runtime.spawn(accept_loop(listener, handler, peers)));
        state.local_addr = Some(local_addr);

        info!("socket channel listening on {local_addr}");
        Ok(())
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        let Some(accept_task) = state.accept_task.take() else {
            return;
        };
        accept_task.abort();

        // Dropping each peer's sender lets its writer task drain and exit;
        // aborting the reader drops the handler reference it holds.
        for (id, peer) in lock(&self.peers).drain() {
            debug!(peer = %id, "closing emulator peer");
            peer.task.abort();
        }
        info!("socket channel stopped");
    }

    fn send(&self, message: &EmulatorMessage) -> Result<(), ChannelError> {
        let frame = frame_message(message)?;
        let peers = lock(&self.peers);

        let mut first_error = None;
        for (id, peer) in peers.iter() {
            match peer.outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(peer = %id, "outbound queue full; dropping message");
                    first_error.get_or_insert(ChannelError::Backpressure(id.to_string()));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Peer is disconnecting; its task removes it from the map.
                    debug!(peer = %id, "peer closed; skipping");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, handler: Arc<dyn InboundHandler>, peers: PeerMap) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept error: {e}");
                continue;
            }
        };

        let id = Uuid::new_v4();
        info!(peer = %id, "emulator peer connected from {addr}");

        let (outbound, queue) = mpsc::channel(PEER_QUEUE_DEPTH);
        let replies = outbound.clone();
        let handler = Arc::clone(&handler);
        let peers_for_task = Arc::clone(&peers);

        // Hold the map lock across the spawn so a peer that disconnects at
        // once cannot try to remove itself before it is inserted.
        {
            let mut map = lock(&peers);
            let task = tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                let writer_task = tokio::spawn(write_frames(writer, queue, id));
                read_frames(reader, replies, handler.as_ref(), id).await;
                lock(&peers_for_task).remove(&id);
                let _ = writer_task.await;
                info!(peer = %id, "emulator peer disconnected");
            });
            map.insert(id, Peer { outbound, task });
        }
    }
}

/// Reads frames from one peer until end-of-stream, answering each envelope
/// through `replies`.
///
/// An oversized frame means the stream is out of sync; the peer is dropped.
pub(crate) async fn read_frames<R>(
    mut reader: R,
    replies: mpsc::Sender<Vec<u8>>,
    handler: &dyn InboundHandler,
    peer: Uuid,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(peer = %peer, "read error: {e}");
            }
            break;
        }

        let len = match frame_len(header) {
            Ok(len) => len,
            Err(e) => {
                warn!(peer = %peer, "dropping peer: {e}");
                break;
            }
        };

        let mut envelope = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut envelope).await {
            warn!(peer = %peer, "truncated frame: {e}");
            break;
        }

        let reply = handler.on_envelope(&envelope);
        if replies.send(frame_reply(&reply)).await.is_err() {
            break;
        }
    }
}

/// Writes queued frames to one peer until every sender is gone.
pub(crate) async fn write_frames<W>(mut writer: W, mut queue: mpsc::Receiver<Vec<u8>>, peer: Uuid)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            error!(peer = %peer, "write error: {e}");
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;
    use crate::infrastructure::channel::UNFRAMEABLE_REPLY_STATUS;
    use vhal_core::protocol::frame::encode_frame;
    use vhal_core::protocol::MAX_FRAME_LEN;
    use vhal_core::{decode_message, MessageType, ResponseStatus};

    /// Answers every envelope with an OK response of the matching kind.
    struct AckHandler;

    impl InboundHandler for AckHandler {
        fn on_envelope(&self, envelope: &[u8]) -> EmulatorMessage {
            match decode_message(envelope) {
                Ok(msg) => EmulatorMessage::response_to(msg.message_type),
                Err(_) => EmulatorMessage::default().with_status(ResponseStatus::InvalidOperation),
            }
        }
    }

    fn framed(msg: &EmulatorMessage) -> Vec<u8> {
        frame_message(msg).expect("frame")
    }

    async fn read_one(stream: &mut TcpStream) -> EmulatorMessage {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        stream.read_exact(&mut header).await.expect("header");
        let mut body = vec![0u8; frame_len(header).unwrap()];
        stream.read_exact(&mut body).await.expect("body");
        decode_message(&body).expect("decode")
    }

    // ── Connection loop against a scripted stream ─────────────────────────────

    #[tokio::test]
    async fn test_read_frames_answers_each_envelope_in_order() {
        // Arrange
        let first = framed(&EmulatorMessage::new(MessageType::GetConfigAllCmd));
        let second = framed(&EmulatorMessage::new(MessageType::GetPropertyAllCmd));
        let reader = tokio_test::io::Builder::new().read(&first).read(&second).build();
        let (tx, mut rx) = mpsc::channel(4);

        // Act
        read_frames(reader, tx, &AckHandler, Uuid::nil()).await;

        // Assert
        let a = rx.recv().await.expect("first reply");
        let b = rx.recv().await.expect("second reply");
        assert_eq!(decode_message(&a[4..]).unwrap().message_type, MessageType::GetConfigAllResp);
        assert_eq!(decode_message(&b[4..]).unwrap().message_type, MessageType::GetPropertyAllResp);
        assert!(rx.recv().await.is_none(), "reader must release its sender at EOF");
    }

    #[tokio::test]
    async fn test_read_frames_answers_garbage_envelope_instead_of_dropping_it() {
        let garbage = encode_frame(&[0xde, 0xad]).unwrap();
        let reader = tokio_test::io::Builder::new().read(&garbage).build();
        let (tx, mut rx) = mpsc::channel(4);

        read_frames(reader, tx, &AckHandler, Uuid::nil()).await;

        let reply = rx.recv().await.expect("reply");
        assert_eq!(
            decode_message(&reply[4..]).unwrap().status,
            ResponseStatus::InvalidOperation
        );
    }

    #[tokio::test]
    async fn test_read_frames_answers_unframeable_reply_with_bare_status() {
        // Arrange
        struct HugeDumpHandler;
        impl InboundHandler for HugeDumpHandler {
            fn on_envelope(&self, _: &[u8]) -> EmulatorMessage {
                let mut reply = EmulatorMessage::response_to(MessageType::DebugCmd);
                reply.debug_result = Some("x".repeat(MAX_FRAME_LEN + 1));
                reply
            }
        }
        let cmd = framed(&EmulatorMessage::new(MessageType::DebugCmd));
        let reader = tokio_test::io::Builder::new().read(&cmd).build();
        let (tx, mut rx) = mpsc::channel(4);

        // Act
        read_frames(reader, tx, &HugeDumpHandler, Uuid::nil()).await;

        // Assert
        let reply = decode_message(&rx.recv().await.expect("one reply")[4..]).unwrap();
        assert_eq!(reply.message_type, MessageType::DebugResp);
        assert_eq!(reply.status, UNFRAMEABLE_REPLY_STATUS);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_read_frames_stops_on_oversized_length() {
        let header = u32::MAX.to_be_bytes();
        let reader = tokio_test::io::Builder::new().read(&header).build();
        let (tx, mut rx) = mpsc::channel(4);

        read_frames(reader, tx, &AckHandler, Uuid::nil()).await;

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_write_frames_drains_queue_to_writer() {
        // Arrange
        let frame = framed(&EmulatorMessage::new(MessageType::SetPropertyAsync));
        let writer = tokio_test::io::Builder::new().write(&frame).write(&frame).build();
        let (tx, rx) = mpsc::channel(4);
        tx.send(frame.clone()).await.unwrap();
        tx.send(frame.clone()).await.unwrap();
        drop(tx);

        // Act / Assert: the mock panics on any unexpected or missing write.
        write_frames(writer, rx, Uuid::nil()).await;
    }

    // ── Real sockets ──────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_socket_channel_answers_requests_and_broadcasts() {
        // Arrange
        let channel = SocketChannel::new("127.0.0.1:0".parse().unwrap(), Handle::current());
        channel.start(Arc::new(AckHandler)).expect("start");
        let addr = channel.local_addr().expect("bound address");
        let mut client = TcpStream::connect(addr).await.expect("connect");

        // Act: request / response
        client
            .write_all(&framed(&EmulatorMessage::new(MessageType::GetConfigAllCmd)))
            .await
            .unwrap();
        let reply = read_one(&mut client).await;

        // Act: broadcast, once the peer is registered
        let async_msg = EmulatorMessage::new(MessageType::SetPropertyAsync);
        channel.send(&async_msg).expect("broadcast");
        let pushed = read_one(&mut client).await;

        // Assert
        assert_eq!(reply.message_type, MessageType::GetConfigAllResp);
        assert_eq!(pushed, async_msg);
        assert_eq!(channel.peer_count(), 1);
        channel.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_send_without_peers_succeeds() {
        let channel = SocketChannel::new("127.0.0.1:0".parse().unwrap(), Handle::current());
        channel.start(Arc::new(AckHandler)).expect("start");

        let result = channel.send(&EmulatorMessage::new(MessageType::SetPropertyAsync));

        assert!(result.is_ok());
        channel.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_twice_is_rejected_and_stop_before_start_is_noop() {
        let channel = SocketChannel::new("127.0.0.1:0".parse().unwrap(), Handle::current());
        channel.stop();

        channel.start(Arc::new(AckHandler)).expect("start");
        assert!(matches!(
            channel.start(Arc::new(AckHandler)),
            Err(ChannelError::AlreadyStarted)
        ));
        channel.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bind_conflict_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let channel = SocketChannel::new(addr, Handle::current());

        let result = channel.start(Arc::new(AckHandler));

        assert!(matches!(result, Err(ChannelError::Bind { .. })));
    }
}
