use async_trait::async_trait;

use crate::common::RawFrame;
use crate::error::{FrameError, SessionError};

/// A live stream of frames owned by exactly one capture loop.
#[async_trait]
pub trait FrameSource: Send {
    /// `FrameError::EndOfStream` when the source is exhausted. Any error ends
    /// the session.
    async fn next_frame(&mut self) -> Result<RawFrame, FrameError>;

    /// Gives the underlying device back. Consumes the source so it can only
    /// happen once.
    fn release(self: Box<Self>);
}

/// Opens frame sources on session start.
pub trait FrameSourceProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, SessionError>;

    fn describe(&self) -> String;
}
