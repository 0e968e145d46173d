pub mod command;
pub mod mjpeg;
pub mod server;

pub use command::{Command, Reply};
pub use server::{ControlServer, VideoServer};
