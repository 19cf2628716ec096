pub mod api;
pub mod catalog;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod polling;
pub mod runtime;

pub use api::{validate_request, JobManager, JobService};
pub use catalog::FlowCatalog;
pub use error::SchedulerError;
pub use model::{
    ExecutionRequest, Job, JobResult, JobStatus, JobStatusView, RunReport, SchedulerConfig,
    SubmitResponse,
};
pub use polling::{JobPoller, PollConfig, PollError, PollOutcome, StatusError, StatusSource};
pub use runtime::SchedulerRuntime;
