use crate::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure kind of an instrumentation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An instruction has no entry in the cost table.
    UnsupportedOpcode,
    /// Nesting went negative, a block was left open, or a branch targets a
    /// label that does not exist.
    MalformedControlFlow,
    /// Instrumentation would exceed an index-space limit.
    IndexSpaceOverflow,
    /// The input module failed structural validation.
    InvalidInput,
    /// The produced binary was rejected by the validator.
    OutputValidation,
}

impl ErrorKind {
    pub fn code(self) -> ErrorCode {
        match self {
            ErrorKind::UnsupportedOpcode => ErrorCode::UNSUPPORTED_OPCODE,
            ErrorKind::MalformedControlFlow => ErrorCode::MALFORMED_CONTROL_FLOW,
            ErrorKind::IndexSpaceOverflow => ErrorCode::INDEX_SPACE_OVERFLOW,
            ErrorKind::InvalidInput => ErrorCode::INVALID_INPUT,
            ErrorKind::OutputValidation => ErrorCode::OUTPUT_VALIDATION,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOpcode => write!(f, "unsupported opcode"),
            Self::MalformedControlFlow => write!(f, "malformed control flow"),
            Self::IndexSpaceOverflow => write!(f, "index space overflow"),
            Self::InvalidInput => write!(f, "invalid input"),
            Self::OutputValidation => write!(f, "output validation"),
        }
    }
}

/// Numeric error code (E100–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const UNSUPPORTED_OPCODE: Self = Self(100);
    pub const MALFORMED_CONTROL_FLOW: Self = Self(200);
    pub const INDEX_SPACE_OVERFLOW: Self = Self(300);
    pub const INVALID_INPUT: Self = Self(400);
    pub const OUTPUT_VALIDATION: Self = Self(500);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured, serializable description of a failed request.
///
/// Hosts render these; they must not parse free-form error strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{loc}: {} [{}] {}", self.code, self.kind, self.message),
            None => write!(f, "{} [{}] {}", self.code, self.kind, self.message),
        }
    }
}
