use action_flow::ValidationError;
use skuflow_core_types::{FlowId, JobId};
use thiserror::Error;

use crate::model::JobStatus;

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("flow {0} not found")]
    FlowNotFound(String),
    #[error("flow {0} is referenced by an active job")]
    FlowInUse(FlowId),
    #[error("flow '{0}' already exists")]
    DuplicateFlow(String),
    #[error("job {job} cannot move from {from} to {to}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::JobNotFound(_) | SchedulerError::FlowNotFound(_)
        )
    }
}
