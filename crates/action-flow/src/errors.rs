//! Flow execution error types

use thiserror::Error;

use crate::driver::DriverError;
use crate::validation::ValidationError;

/// Flow authoring and traversal errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    /// Flow document failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Interruption handler could not recover within its retry budget
    #[error("interruption '{interruption}' exhausted {attempts} retries: {reason}")]
    RetriesExhausted {
        interruption: String,
        attempts: u32,
        reason: String,
    },

    /// `next.xpath` names a locator that is not a step of the flow
    #[error("step '{from}' points to unknown locator '{target}'")]
    DanglingReference { from: String, target: String },

    /// A locator was reached twice in one traversal
    #[error("cycle detected: locator '{locator}' was already visited")]
    CyclicFlow { locator: String },

    /// Main step failed and no interruption recovered it
    #[error("step '{locator}' failed: {reason}")]
    StepFailed { locator: String, reason: String },

    /// Navigation to the flow url failed
    #[error("driver error: {0}")]
    Driver(String),

    /// Traversal exceeded the engine deadline
    #[error("flow execution timed out after {0}ms")]
    Timeout(u64),
}

impl FlowError {
    /// Stable machine-readable label used in result payloads and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Validation(_) => "validation_error",
            FlowError::RetriesExhausted { .. } => "retries_exhausted",
            FlowError::DanglingReference { .. } => "dangling_reference",
            FlowError::CyclicFlow { .. } => "cyclic_flow",
            FlowError::StepFailed { .. } => "step_failed",
            FlowError::Driver(_) => "driver_error",
            FlowError::Timeout(_) => "timeout",
        }
    }

    /// Structural defects of the flow definition itself.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FlowError::Validation(_)
                | FlowError::DanglingReference { .. }
                | FlowError::CyclicFlow { .. }
        )
    }
}

impl From<DriverError> for FlowError {
    fn from(err: DriverError) -> Self {
        FlowError::Driver(err.to_string())
    }
}
