// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the filter engine and configuration
//!
//! Camera errors live next to the camera backend in
//! [`crate::backends::camera::BackendError`].

use std::error::Error as StdError;

/// Result type alias for filter operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Boxed cause attached to processing errors
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by filter engine operations
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The input buffer is empty or of an unsupported sample type
    #[error("{operation}: invalid argument: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    /// A numeric parameter is outside its valid range
    #[error("{operation}: {parameter} = {value} is out of range ({expected})")]
    OutOfRange {
        operation: &'static str,
        parameter: &'static str,
        value: i64,
        expected: &'static str,
    },

    /// The algorithm failed on an otherwise valid call
    #[error("{operation}: processing failed: {message}")]
    Processing {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },
}

/// Discriminant of [`FilterError`], for callers that only care about the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterErrorKind {
    InvalidArgument,
    OutOfRange,
    Processing,
}

impl FilterError {
    pub fn invalid_argument(operation: &'static str, reason: impl Into<String>) -> Self {
        FilterError::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    pub fn out_of_range(
        operation: &'static str,
        parameter: &'static str,
        value: i64,
        expected: &'static str,
    ) -> Self {
        FilterError::OutOfRange {
            operation,
            parameter,
            value,
            expected,
        }
    }

    pub fn processing(operation: &'static str, message: impl Into<String>) -> Self {
        FilterError::Processing {
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying failure, keeping it reachable through `source()`
    pub fn processing_with_source(
        operation: &'static str,
        message: impl Into<String>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        FilterError::Processing {
            operation,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> FilterErrorKind {
        match self {
            FilterError::InvalidArgument { .. } => FilterErrorKind::InvalidArgument,
            FilterError::OutOfRange { .. } => FilterErrorKind::OutOfRange,
            FilterError::Processing { .. } => FilterErrorKind::Processing,
        }
    }

    /// Name of the operation that failed
    pub fn operation(&self) -> &'static str {
        match self {
            FilterError::InvalidArgument { operation, .. }
            | FilterError::OutOfRange { operation, .. }
            | FilterError::Processing { operation, .. } => operation,
        }
    }
}

/// Errors raised while loading the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
