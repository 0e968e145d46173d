pub mod buffer;
pub mod controller;
pub mod display;
pub mod events;
pub mod processor;
pub mod state;

pub use buffer::TemporalBuffer;
pub use controller::{SessionController, SessionTicket};
pub use display::{Clock, DisplayGate, ManualClock, SystemClock};
pub use events::SessionEvent;
pub use processor::{FrameOutput, FrameProcessor};
pub use state::{Publication, SessionSnapshot};
