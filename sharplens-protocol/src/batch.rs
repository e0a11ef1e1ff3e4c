//! Runs homogeneous sub-requests one by one with per-item failure isolation.
//!
//! The caller hands in a closure that already captured the snapshot it wants
//! every item evaluated against.

use crate::envelope::ErrorBody;
use serde::Serialize;
use sharplens_core::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// What a batch does with an empty request list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyInput {
    /// Lookup-style batches: nothing requested, nothing returned
    Accept,
    /// Batches that need at least one target to act on
    Reject,
}

/// A failed item: the request's own fields plus `success` and `error`
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError<R> {
    #[serde(flatten)]
    pub request: R,
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult<R, T> {
    pub total_requested: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<T>,
    pub errors: Vec<BatchItemError<R>>,
}

impl<R, T> BatchResult<R, T> {
    fn empty() -> Self {
        Self {
            total_requested: 0,
            success_count: 0,
            error_count: 0,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub fn execute<R, T, F>(
    operation: &str,
    requests: Vec<R>,
    empty_input: EmptyInput,
    mut run: F,
) -> Result<BatchResult<R, T>>
where
    F: FnMut(&R) -> Result<T>,
{
    if requests.is_empty() {
        return match empty_input {
            EmptyInput::Accept => Ok(BatchResult::empty()),
            EmptyInput::Reject => Err(Error::invalid_argument(format!(
                "{} requires at least one request",
                operation
            ))),
        };
    }

    let mut batch = BatchResult::empty();
    batch.total_requested = requests.len();

    for (index, request) in requests.into_iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&request))).unwrap_or_else(
            |payload| {
                Err(Error::internal(format!(
                    "Batch item panicked: {}",
                    panic_message(payload.as_ref())
                )))
            },
        );

        match outcome {
            Ok(result) => batch.results.push(result),
            Err(error) => {
                debug!("{} item {} failed: {}", operation, index, error);
                batch.errors.push(BatchItemError {
                    request,
                    success: false,
                    error: ErrorBody::from(&error),
                });
            }
        }
    }

    batch.success_count = batch.results.len();
    batch.error_count = batch.errors.len();
    if batch.error_count > 0 {
        warn!(
            "{} completed with {} of {} items failing",
            operation, batch.error_count, batch.total_requested
        );
    }
    Ok(batch)
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
