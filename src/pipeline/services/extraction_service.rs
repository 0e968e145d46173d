use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use crate::common::{KeypointSet, RawFrame};
use crate::error::PipelineError;
use crate::pipeline::landmarks::LandmarkExtractor;

/// Adapts a `LandmarkExtractor` to a tower service so it can be layered
/// (timeouts) and boxed like the other pipeline stages.
#[derive(Clone)]
pub struct ExtractionService {
    inner: Arc<dyn LandmarkExtractor>,
}

impl ExtractionService {
    pub fn new(inner: Arc<dyn LandmarkExtractor>) -> Self {
        Self { inner }
    }
}

impl Service<RawFrame> for ExtractionService {
    type Response = Option<KeypointSet>;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: RawFrame) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { inner.extract(&frame).await })
    }
}
