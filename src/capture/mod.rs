pub mod convert;
pub mod frame;
pub mod synthetic;

pub use convert::{convert, convert_planar};
pub use frame::Frame;
pub use frame::PixelFormat;
pub use synthetic::SyntheticCapture;
