use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use skuflow_core_types::{FlowId, JobId};

use crate::error::SchedulerError;
use crate::model::{Job, JobStatus, SchedulerConfig};

/// Shared job table plus the running-job slots.
///
/// The orchestrator task that owns a job is its only writer; the table
/// rejects any status regression.
#[derive(Debug)]
pub struct SchedulerRuntime {
    jobs: DashMap<JobId, Job>,
    running_slots: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl SchedulerRuntime {
    pub fn new(config: SchedulerConfig) -> Self {
        let slots = config.max_running_jobs.max(1);
        Self {
            jobs: DashMap::new(),
            running_slots: Arc::new(Semaphore::new(slots)),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn running_slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.running_slots)
    }

    /// Stop handing out running slots. Jobs still queued fail; running jobs finish.
    pub fn shutdown(&self) {
        if self.running_slots.is_closed() {
            return;
        }
        self.running_slots.close();
        info!(pending = self.pending(), "scheduler shutting down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.running_slots.is_closed()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshots ordered by creation time.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub fn pending(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }

    /// Whether a non-terminal job references `flow`.
    pub fn references_active(&self, flow: &FlowId) -> bool {
        self.jobs
            .iter()
            .any(|entry| !entry.status.is_terminal() && entry.flow_refs.contains(flow))
    }

    pub fn mark_started(&self, id: &JobId) -> Result<Job, SchedulerError> {
        self.transition(id, JobStatus::Started, |job| {
            job.started_at = Some(Utc::now());
        })
    }

    pub fn complete(&self, id: &JobId, result: Value) -> Result<Job, SchedulerError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.result = Some(result);
            job.finished_at = Some(Utc::now());
        })
    }

    /// Terminal failure; an empty message is replaced so `error` is never blank.
    pub fn fail(
        &self,
        id: &JobId,
        error: impl Into<String>,
        result: Option<Value>,
    ) -> Result<Job, SchedulerError> {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "job failed".to_string();
        }
        self.transition(id, JobStatus::Failed, |job| {
            job.error = Some(error);
            job.result = result;
            job.finished_at = Some(Utc::now());
        })
    }

    fn transition(
        &self,
        id: &JobId,
        next: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> Result<Job, SchedulerError> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.clone()))?;
        let current = entry.status;
        if !current.can_transition_to(next) {
            warn!(job = %id, from = %current, to = %next, "rejected status regression");
            return Err(SchedulerError::InvalidTransition {
                job: id.clone(),
                from: current,
                to: next,
            });
        }
        entry.status = next;
        apply(&mut *entry);
        debug!(job = %id, from = %current, to = %next, "job transition");
        Ok(entry.value().clone())
    }
}
