//! Pipeline error types.

use gasm_meter::MeterError;
use gasm_types::{ErrorKind, ErrorReport, Location};
use thiserror::Error;

/// Errors produced while turning an input binary into a metered one.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input bytes could not be read as a WebAssembly binary.
    #[error("binary parse error: {0}")]
    Parse(#[from] wasmparser::BinaryReaderError),

    /// The input failed WebAssembly validation.
    #[error("input validation failed: {0}")]
    InputValidation(String),

    /// A valid operator outside the instruction set the pass understands.
    #[error("{location}: unsupported operator `{operator}`")]
    UnsupportedOperator { location: Location, operator: String },

    /// A module-level construct outside WebAssembly 1.0.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error(transparent)]
    Meter(#[from] MeterError),

    /// The metered binary was rejected by the validator.
    #[error("output validation failed: {0}")]
    OutputValidation(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Parse(_)
            | PipelineError::InputValidation(_)
            | PipelineError::UnsupportedFeature(_) => ErrorKind::InvalidInput,
            PipelineError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOpcode,
            PipelineError::Meter(e) => e.kind(),
            PipelineError::OutputValidation(_) => ErrorKind::OutputValidation,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            PipelineError::UnsupportedOperator { location, .. } => Some(*location),
            PipelineError::Meter(e) => e.location(),
            _ => None,
        }
    }

    /// Structured form for hosts.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport::new(self.kind(), self.to_string(), self.location())
    }
}

/// Pipeline result type alias.
pub type PipelineResult<T> = Result<T, PipelineError>;
