pub mod capture;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, FrameError, PipelineError, SessionError};
