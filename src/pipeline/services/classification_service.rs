use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use crate::common::Prediction;
use crate::error::PipelineError;
use crate::pipeline::classifier::GestureClassifier;

pub struct ClassificationService<I> {
    inner: Arc<dyn GestureClassifier<I>>,
}

impl<I> ClassificationService<I> {
    pub fn new(inner: Arc<dyn GestureClassifier<I>>) -> Self {
        Self { inner }
    }
}

impl<I> Clone for ClassificationService<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> Service<I> for ClassificationService<I>
where
    I: Send + Sync + 'static,
{
    type Response = Prediction;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, input: I) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { inner.classify(&input).await })
    }
}
