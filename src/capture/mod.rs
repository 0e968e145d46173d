pub mod capture_loop;
pub mod image_sequence;
pub mod source;
pub mod synthetic;

pub use capture_loop::{CaptureLoop, EndReason};
pub use image_sequence::ImageSequenceProvider;
pub use source::{FrameSource, FrameSourceProvider};
pub use synthetic::SyntheticSourceProvider;
