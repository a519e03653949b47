// src/error/non_fatal.rs

use crate::error::{AppError, Result};
use tracing::warn;

/// Outcome of a best-effort side effect.
///
/// The error, if any, is reported through [`NonFatal::log`] and never
/// reaches the caller's response path.
#[must_use = "call `.log(..)` so the failure is reported"]
#[derive(Debug)]
pub struct NonFatal(Result<()>);

impl NonFatal {
    pub fn ok() -> Self {
        Self(Ok(()))
    }

    pub fn is_ok(&self) -> bool {
        self.0.is_ok()
    }

    pub fn error(&self) -> Option<&AppError> {
        self.0.as_ref().err()
    }

    /// Logs the failure at `warn` and discards it.
    pub fn log(self, operation: &'static str) {
        if let Err(e) = self.0 {
            warn!(operation, error = %e, error.kind = e.kind(), "Non-fatal side effect failed");
        }
    }
}

impl From<Result<()>> for NonFatal {
    fn from(result: Result<()>) -> Self {
        Self(result)
    }
}
