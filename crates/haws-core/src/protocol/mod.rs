//! Protocol module containing the message types and the JSON codec.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode, encode, ProtocolError};
pub use messages::*;
pub use sequence::MessageIdAllocator;
