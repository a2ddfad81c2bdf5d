// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Error types for the TPC-C workload engine.
//!
//! This module provides:
//! - [`TpccError`] - The error enum shared by every backend and executor
//! - [`Result<T>`] - A type alias for `std::result::Result<T, TpccError>`
//!
//! The designed NewOrder rollback (an order that references an unused item id)
//! is not an error. It is reported as
//! [`NewOrderOutcome::InvalidItem`](crate::executor::NewOrderOutcome::InvalidItem).

/// Result type alias for workload operations.
pub type Result<T> = std::result::Result<T, TpccError>;

/// Errors raised while loading or running the TPC-C workload.
///
/// Errors fall into two classes. Transient errors ([`TpccError::Conflict`])
/// mean the unit of work lost a race against another worker and may be retried.
/// Every other variant is fatal for the iteration that raised it.
///
/// # Examples
///
/// ```rust
/// use synadb_tpcc::TpccError;
///
/// let err = TpccError::Conflict("district 1/3 changed".to_string());
/// assert!(err.is_transient());
///
/// let err = TpccError::Invariant("no customer 1/3/42".to_string());
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TpccError {
    /// Scale parameters exceed a TPC-C ceiling or are otherwise unusable.
    #[error("Invalid scale parameters: {0}")]
    InvalidScale(String),

    /// A helper was called outside its documented domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization failure, deadlock or write-write conflict.
    ///
    /// The whole unit of work should be retried.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Any other failure reported by a storage engine.
    #[error("{engine} error: {message}")]
    Backend {
        /// Engine that raised the error
        engine: &'static str,
        /// Driver message
        message: String,
    },

    /// A structural invariant of a correctly loaded dataset does not hold.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A stored value could not be decoded into the expected type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while opening a backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A transaction kept conflicting after the configured number of retries.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last conflict
        last: String,
    },

    /// A worker saw too many fatal failures in a row.
    #[error("Worker {worker} aborted after {failures} consecutive failures")]
    TooManyFailures {
        /// Worker index
        worker: usize,
        /// Consecutive failures observed
        failures: u32,
    },
}

impl TpccError {
    /// Returns true when the unit of work may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TpccError::Conflict(_))
    }

    /// Shorthand for a [`TpccError::Invariant`] error.
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        TpccError::Invariant(message.into())
    }
}
