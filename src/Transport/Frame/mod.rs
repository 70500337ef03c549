pub mod Header;
pub mod codec;
pub mod layout;

pub use layout::{SlotLayout, WireHeader};
pub use Header::{Frame, FrameHeader, HEADER_SIZE, MAGIC_NUMBER};
