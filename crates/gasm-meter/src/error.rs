//! Metering error types.

use gasm_types::{ErrorKind, ErrorReport, Location};
use thiserror::Error;

/// Errors that abort a metering request.
///
/// Every failure is fatal: a partially metered module is never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    /// An instruction has no cost-table entry.
    #[error("{location}: unsupported opcode `{opcode}`")]
    UnsupportedOpcode { location: Location, opcode: String },

    /// Unbalanced nesting or a branch to a missing label.
    #[error("{location}: malformed control flow: {reason}")]
    MalformedControlFlow { location: Location, reason: String },

    /// Instrumentation would grow an index space past its limit.
    #[error("{space} index space overflow: {required} entries exceed the limit of {limit}")]
    IndexSpaceOverflow {
        space: &'static str,
        required: u64,
        limit: u32,
    },

    /// The input module is structurally invalid.
    #[error("invalid input: {reason}")]
    InvalidInput {
        reason: String,
        location: Option<Location>,
    },
}

impl MeterError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        MeterError::InvalidInput {
            reason: reason.into(),
            location: None,
        }
    }

    pub fn invalid_at(location: Location, reason: impl Into<String>) -> Self {
        MeterError::InvalidInput {
            reason: reason.into(),
            location: Some(location),
        }
    }

    pub fn malformed(location: Location, reason: impl Into<String>) -> Self {
        MeterError::MalformedControlFlow {
            location,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MeterError::UnsupportedOpcode { .. } => ErrorKind::UnsupportedOpcode,
            MeterError::MalformedControlFlow { .. } => ErrorKind::MalformedControlFlow,
            MeterError::IndexSpaceOverflow { .. } => ErrorKind::IndexSpaceOverflow,
            MeterError::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            MeterError::UnsupportedOpcode { location, .. }
            | MeterError::MalformedControlFlow { location, .. } => Some(*location),
            MeterError::InvalidInput { location, .. } => *location,
            MeterError::IndexSpaceOverflow { .. } => None,
        }
    }

    /// Structured form for hosts.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport::new(self.kind(), self.to_string(), self.location())
    }
}

/// Metering result type alias.
pub type MeterResult<T> = Result<T, MeterError>;
