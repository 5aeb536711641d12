//! Tagged result of a cancellable orchestration call.

use crate::error::{Result, StanError};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// How a cancellable call ended.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    /// The cancellation token fired first. Remote operations already issued are left as they are.
    Cancelled,
    Failed(StanError),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// Collapse into a `Result`, with cancellation as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Outcome::Completed(value) => Ok(Some(value)),
            Outcome::Cancelled => Ok(None),
            Outcome::Failed(err) => Err(err),
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Completed(value),
            Err(err) => Outcome::Failed(err),
        }
    }
}

/// Drive `fut` to completion unless `cancel` fires first, in which case `fut` is dropped.
pub(crate) async fn run_cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Outcome<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        result = fut => result.into(),
    }
}
