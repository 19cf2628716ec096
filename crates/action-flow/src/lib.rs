//! Declarative step-automation flows
//!
//! This crate owns the flow model and the engine that runs it:
//! - authored [`FlowDocument`]s validated into indexed [`Flow`]s
//! - deterministic retry backoff for interruption handlers
//! - the interruption supervisor that may preempt and resume traversal
//! - the step traversal engine behind [`FlowExecutor`]

pub mod driver;
pub mod errors;
pub mod executor;
pub mod strategies;
pub mod supervisor;
pub mod types;
pub mod validation;

pub use driver::{
    ActionDriver, ActionOutcome, DriverCall, DriverError, NoopDriver, PageFixture, ScriptedDriver,
};
pub use errors::FlowError;
pub use executor::{DefaultFlowExecutor, EngineConfig, FlowExecutor};
pub use strategies::{next_delay, BackoffPolicy, DeterministicBackoff, ImmediateBackoff, RetryDecision};
pub use supervisor::{InterruptionSupervisor, Observation, SupervisorOutcome, SupervisorState};
pub use types::{
    Action, Flow, FlowContext, FlowDocument, FlowResult, Interruption, InterruptionRecord,
    RetryConfig, RetryStrategy, Step, StepResult, TraversalCursor, TriggerOn,
};
pub use validation::{ValidationError, ValidationIssue};
