//! Protocol module: framing, the packet model, the registry and the codec.

pub mod codec;
pub mod frame;
pub mod packet;
pub mod registry;
pub mod request_id;

pub use codec::{decode_packet, encode_packet};
pub use frame::{
    encode_frame, FrameError, FrameEvent, FrameReader, FrameWriter, SkipReason, MAX_FRAME_LEN,
};
pub use packet::*;
pub use registry::PacketRegistry;
pub use request_id::{next_request_id, RequestIdGenerator};
