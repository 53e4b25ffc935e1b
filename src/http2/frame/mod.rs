//! # HTTP/2 バイナリフレームコーデック (RFC 7540 Section 4)

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use types::{flags, Frame, FrameHeader, FrameType, FRAME_HEADER_LEN};
