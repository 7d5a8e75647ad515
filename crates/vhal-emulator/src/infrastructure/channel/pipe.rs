//! Pipe channel for the console co-located with a virtualized guest.
//!
//! The guest exposes a character device (or FIFO) that the console on the
//! other side reads and writes. There is exactly one peer, served by two
//! named threads:
//!
//! ```text
//! vhal-pipe-reader   frames → InboundHandler → reply queued
//! vhal-pipe-writer   drains the bounded queue onto the device
//! ```
//!
//! Replies and broadcasts share the queue, so frames never interleave.
//! Broadcasts use `try_send`: a console that stops reading costs the caller
//! a [`ChannelError::Backpressure`], never a blocked thread.
//!
//! Blocking reads and writes on a device cannot be interrupted portably, so
//! `stop()` joins neither thread. The reader notices the stop flag at the
//! next frame or end of stream; the writer exits once the queue is closed
//! and drained.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use tracing::{debug, error, info, warn};
use vhal_core::protocol::frame::{read_frame, FrameError};
use vhal_core::EmulatorMessage;

use super::{frame_message, frame_reply, ChannelError, InboundHandler, TransportChannel};

/// Default device node of the emulator pipe.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/vhal-emulator-pipe";

/// Frames queued for the console before broadcasts start being dropped.
pub const PIPE_QUEUE_DEPTH: usize = 64;

const PEER_NAME: &str = "console";

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;
type Outbound = Arc<Mutex<Option<SyncSender<Vec<u8>>>>>;

/// How the channel reaches its peer.
enum Endpoint {
    /// Opened read/write when the channel starts.
    Device(PathBuf),
    /// Already-open streams, such as one end of a socket pair.
    Streams(BoxedReader, BoxedWriter),
}

/// Pipe implementation of [`TransportChannel`].
pub struct PipeChannel {
    endpoint: Mutex<Option<Endpoint>>,
    outbound: Outbound,
    running: Arc<AtomicBool>,
}

impl PipeChannel {
    /// Creates a channel that opens `device_path` when started.
    pub fn open(device_path: impl AsRef<Path>) -> Self {
        Self::with_endpoint(Endpoint::Device(device_path.as_ref().to_path_buf()))
    }

    /// Creates a channel over already-open read and write halves.
    pub fn from_streams(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self::with_endpoint(Endpoint::Streams(Box::new(reader), Box::new(writer)))
    }

    fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint: Mutex::new(Some(endpoint)),
            outbound: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TransportChannel for PipeChannel {
    fn name(&self) -> &str {
        "pipe"
    }

    fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<(), ChannelError> {
        let endpoint = lock(&self.endpoint)
            .take()
            .ok_or(ChannelError::AlreadyStarted)?;

        let (reader, writer): (BoxedReader, BoxedWriter) = match endpoint {
            Endpoint::Device(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|source| ChannelError::Open {
                        path: path.clone(),
                        source,
                    })?;
                let read_half = file.try_clone()?;
                info!("pipe channel opened {}", path.display());
                (Box::new(read_half), Box::new(file))
            }
            Endpoint::Streams(reader, writer) => (reader, writer),
        };

        let (tx, queue) = mpsc::sync_channel(PIPE_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("vhal-pipe-writer".to_string())
            .spawn(move || writer_loop(writer, queue))?;

        *lock(&self.outbound) = Some(tx);
        self.running.store(true, Ordering::SeqCst);

        let outbound = Arc::clone(&self.outbound);
        let running = Arc::clone(&self.running);
        std::thread::Builder::new()
            .name("vhal-pipe-reader".to_string())
            .spawn(move || reader_loop(reader, outbound, handler, running))?;

        info!("pipe channel started");
        Ok(())
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // Closing the queue lets the writer drain and drop our write half.
        *lock(&self.outbound) = None;
        info!("pipe channel stopped");
    }

    fn send(&self, message: &EmulatorMessage) -> Result<(), ChannelError> {
        let frame = frame_message(message)?;
        let guard = lock(&self.outbound);
        let tx = guard.as_ref().ok_or(ChannelError::NotStarted)?;
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("pipe outbound queue full; dropping message");
                Err(ChannelError::Backpressure(PEER_NAME.to_string()))
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Closed),
        }
    }
}

/// Blocking receive loop executed on the reader thread.
fn reader_loop(
    mut reader: BoxedReader,
    outbound: Outbound,
    handler: Arc<dyn InboundHandler>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let envelope = match read_frame(&mut reader) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                info!("pipe peer closed the stream");
                break;
            }
            Err(FrameError::TooLarge(len)) => {
                // No way to resynchronise a byte stream after a bad length.
                error!("pipe frame of {len} bytes exceeds limit; stopping reader");
                break;
            }
            Err(FrameError::Io(e)) => {
                if running.load(Ordering::SeqCst) {
                    warn!("pipe read error: {e}");
                }
                break;
            }
        };

        if !running.load(Ordering::SeqCst) {
            break;
        }

        let frame = frame_reply(&handler.on_envelope(&envelope));

        // Replies wait for queue space; only broadcasts are dropped.
        let tx = lock(&outbound).clone();
        match tx {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    debug!("pipe writer gone; stopping reader");
                    break;
                }
            }
            None => debug!("pipe stopped; dropping reply"),
        }
    }

    debug!("pipe reader thread exiting");
}

/// Writes queued frames to the device until the queue closes.
fn writer_loop(mut writer: BoxedWriter, queue: Receiver<Vec<u8>>) {
    for frame in queue {
        if let Err(e) = writer.write_all(&frame).and_then(|()| writer.flush()) {
            error!("pipe write error: {e}");
            break;
        }
    }
    debug!("pipe writer thread exiting");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
