//! Frame encoding: surfaces, the bulk header and the RGB888 payload.

pub mod encoder;
pub mod header;
pub mod types;

pub use encoder::{EncodedFrame, FrameEncoder, encode, encode_into, encoded_len};
pub use header::FrameHeader;
pub use types::{FrameSource, FrameSurface, PixelFormat, Rect};
