use std::sync::Arc;

use action_flow::{Flow, FlowExecutor, ValidationError, ValidationIssue};
use async_trait::async_trait;
use skuflow_core_types::{FlowId, JobId, RequestContext};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::metrics;
use crate::model::{sku_search_term, ExecutionRequest, Job, JobStatusView};
use crate::orchestrator::Orchestrator;
use crate::polling::{StatusError, StatusSource};
use crate::runtime::SchedulerRuntime;

#[async_trait]
pub trait JobService: Send + Sync {
    /// Validate, enqueue and start a job; returns before it runs.
    async fn submit(
        &self,
        context: RequestContext,
        request: ExecutionRequest,
    ) -> Result<JobId, SchedulerError>;
    async fn status(&self, job_id: &JobId) -> Result<JobStatusView, SchedulerError>;
    async fn job(&self, job_id: &JobId) -> Result<Job, SchedulerError>;
    async fn list(&self) -> Vec<Job>;
    /// Refuse new jobs and fail the ones still waiting for a slot.
    fn shutdown(&self);
}

/// Check a request without creating a job.
///
/// Every flow is validated; issues are re-rooted under `flows[i]`.
pub fn validate_request(request: &ExecutionRequest) -> Result<Vec<Flow>, ValidationError> {
    let mut issues = Vec::new();
    if request.flows.is_empty() {
        issues.push(ValidationIssue::new("flows", "at least one flow is required"));
    }
    if request.skus.is_empty() {
        issues.push(ValidationIssue::new("skus", "at least one sku is required"));
    }

    let mut flows = Vec::with_capacity(request.flows.len());
    for (position, document) in request.flows.iter().enumerate() {
        match Flow::from_document(document.clone()) {
            Ok(flow) if flow.id().is_empty() => flows.push(flow.with_id(FlowId::new())),
            Ok(flow) => flows.push(flow),
            Err(err) => issues.extend(err.prefixed(&format!("flows[{position}]")).into_issues()),
        }
    }

    if issues.is_empty() {
        Ok(flows)
    } else {
        Err(ValidationError::new(issues))
    }
}

pub struct JobManager<E>
where
    E: FlowExecutor + 'static,
{
    runtime: Arc<SchedulerRuntime>,
    orchestrator: Orchestrator<E>,
}

impl<E> JobManager<E>
where
    E: FlowExecutor + 'static,
{
    pub fn new(runtime: Arc<SchedulerRuntime>, executor: Arc<E>) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&runtime), executor);
        Self {
            runtime,
            orchestrator,
        }
    }

    pub fn runtime(&self) -> Arc<SchedulerRuntime> {
        Arc::clone(&self.runtime)
    }
}

#[async_trait]
impl<E> JobService for JobManager<E>
where
    E: FlowExecutor + 'static,
{
    async fn submit(
        &self,
        context: RequestContext,
        request: ExecutionRequest,
    ) -> Result<JobId, SchedulerError> {
        if self.runtime.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown);
        }
        let flows = match validate_request(&request) {
            Ok(flows) => flows,
            Err(err) => {
                metrics::record_rejected();
                warn!(%context, issues = err.issues().len(), "execution request rejected");
                return Err(err.into());
            }
        };

        let job_id = JobId::new();
        let job = Job::queued(
            job_id.clone(),
            flows.iter().map(|flow| flow.id().clone()).collect(),
            request.skus.iter().map(sku_search_term).collect(),
            context.clone(),
        );
        self.runtime.insert(job);
        metrics::record_submitted();
        info!(
            job = %job_id,
            %context,
            flows = flows.len(),
            skus = request.skus.len(),
            "job queued"
        );

        self.orchestrator.launch(job_id.clone(), flows, request.skus);
        Ok(job_id)
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatusView, SchedulerError> {
        self.job(job_id).await.map(|job| job.view())
    }

    async fn job(&self, job_id: &JobId) -> Result<Job, SchedulerError> {
        self.runtime
            .get(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.clone()))
    }

    async fn list(&self) -> Vec<Job> {
        self.runtime.list()
    }

    fn shutdown(&self) {
        self.runtime.shutdown();
    }
}

#[async_trait]
impl<E> StatusSource for JobManager<E>
where
    E: FlowExecutor + 'static,
{
    async fn fetch(&self, job_id: &JobId) -> Result<JobStatusView, StatusError> {
        self.runtime
            .get(job_id)
            .map(|job| job.view())
            .ok_or_else(|| StatusError::NotFound(job_id.clone()))
    }
}

#[async_trait]
impl<D> JobService for Arc<D>
where
    D: JobService + ?Sized,
{
    async fn submit(
        &self,
        context: RequestContext,
        request: ExecutionRequest,
    ) -> Result<JobId, SchedulerError> {
        (**self).submit(context, request).await
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatusView, SchedulerError> {
        (**self).status(job_id).await
    }

    async fn job(&self, job_id: &JobId) -> Result<Job, SchedulerError> {
        (**self).job(job_id).await
    }

    async fn list(&self) -> Vec<Job> {
        (**self).list().await
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}
