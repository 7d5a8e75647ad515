//! Length-prefixed framing for byte-stream transports.
//!
//! Each envelope travels as `[len:4 BE][envelope bytes]`. The socket channel
//! reads frames with tokio; the pipe channel uses the blocking helpers here.

use std::io::{self, Read, Write};

use thiserror::Error;

use super::codec::encode_bare;
use super::messages::{MessageType, ResponseStatus};

/// Size of the frame length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest envelope a peer may send. Anything bigger is treated as a
/// corrupted stream.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN} bytes")]
    TooLarge(usize),

    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Prepends the 4-byte length prefix to `envelope`.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if `envelope` exceeds [`MAX_FRAME_LEN`].
pub fn encode_frame(envelope: &[u8]) -> Result<Vec<u8>, FrameError> {
    if envelope.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(envelope.len()));
    }
    Ok(prefixed(envelope))
}

/// Frames a payload-free envelope of `message_type` carrying `status`.
///
/// The envelope is a fixed dozen bytes, so no size check is needed.
pub fn bare_frame(message_type: MessageType, status: ResponseStatus) -> Vec<u8> {
    prefixed(&encode_bare(message_type, status))
}

fn prefixed(envelope: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + envelope.len());
    out.extend_from_slice(&(envelope.len() as u32).to_be_bytes());
    out.extend_from_slice(envelope);
    out
}

/// Parses a length prefix and checks it against [`MAX_FRAME_LEN`].
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] for an oversized length.
pub fn frame_len(header: [u8; FRAME_HEADER_SIZE]) -> Result<usize, FrameError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    Ok(len)
}

/// Reads one frame from a blocking reader.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary.
///
/// # Errors
///
/// Returns [`FrameError::Io`] on read failure or on end-of-stream inside a
/// frame, and [`FrameError::TooLarge`] for an oversized length prefix.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameError::Io(e)),
    }
    let len = frame_len(header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Writes one frame to a blocking writer and flushes it.
///
/// # Errors
///
/// Returns [`FrameError`] if the envelope is too large or the write fails.
pub fn write_frame<W: Write>(writer: &mut W, envelope: &[u8]) -> Result<(), FrameError> {
    let frame = encode_frame(envelope)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}
