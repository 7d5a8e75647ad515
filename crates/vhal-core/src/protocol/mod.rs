//! Protocol module containing message types, the envelope codec, and framing.

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{decode_message, encode_bare, encode_message, peek_message_type, ProtocolError};
pub use frame::{FrameError, MAX_FRAME_LEN};
pub use messages::*;
