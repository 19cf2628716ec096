//! Client-side polling of job status
//!
//! Two separate budgets apply: `max_polls` bounds how many non-terminal
//! answers the caller tolerates, `max_transient_errors` bounds failed status
//! calls. Running out of polls yields [`PollOutcome::Timeout`], an observation
//! of the caller only; the job itself is never touched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use skuflow_core_types::JobId;

use crate::model::{JobStatus, JobStatusView};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// Network-level failure; worth retrying
    #[error("transient status error: {0}")]
    Transient(String),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("status call failed: {0}")]
    Fatal(String),
}

/// Where job status comes from: in-process or over HTTP.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, job_id: &JobId) -> Result<JobStatusView, StatusError>;
}

#[async_trait]
impl<S> StatusSource for Arc<S>
where
    S: StatusSource + ?Sized,
{
    async fn fetch(&self, job_id: &JobId) -> Result<JobStatusView, StatusError> {
        (**self).fetch(job_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_polls: u32,
    pub transient_interval_ms: u64,
    pub max_transient_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            max_polls: 30,
            transient_interval_ms: 2_000,
            max_transient_errors: 10,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn transient_interval(&self) -> Duration {
        Duration::from_millis(self.transient_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Worker result, attached verbatim
    Completed { result: Option<Value> },
    Failed { error: String },
    /// Gave up waiting; the job may still finish
    Timeout {
        polls: u32,
        last_status: Option<JobStatus>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("status unavailable after {attempts} failed calls: {reason}")]
    Transport { attempts: u32, reason: String },
    #[error("{0}")]
    Fatal(String),
}

pub struct JobPoller<S>
where
    S: StatusSource + ?Sized,
{
    source: Arc<S>,
    config: PollConfig,
}

impl<S> JobPoller<S>
where
    S: StatusSource + ?Sized,
{
    pub fn new(source: Arc<S>, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until the job is terminal or a budget runs out.
    pub async fn wait(&self, job_id: &JobId) -> Result<PollOutcome, PollError> {
        let mut polls = 0u32;
        let mut transient_errors = 0u32;

        loop {
            match self.source.fetch(job_id).await {
                Ok(view) => match view.status {
                    JobStatus::Completed => {
                        info!(job = %job_id, polls, "job completed");
                        return Ok(PollOutcome::Completed {
                            result: view.result,
                        });
                    }
                    JobStatus::Failed => {
                        let error = view
                            .error
                            .filter(|message| !message.is_empty())
                            .unwrap_or_else(|| "job failed".to_string());
                        info!(job = %job_id, polls, %error, "job failed");
                        return Ok(PollOutcome::Failed { error });
                    }
                    status => {
                        polls += 1;
                        debug!(job = %job_id, %status, polls, "job still running");
                        if polls >= self.config.max_polls {
                            warn!(job = %job_id, polls, "gave up waiting for job");
                            return Ok(PollOutcome::Timeout {
                                polls,
                                last_status: Some(status),
                            });
                        }
                        sleep(self.config.interval()).await;
                    }
                },
                Err(StatusError::Transient(reason)) => {
                    transient_errors += 1;
                    if transient_errors > self.config.max_transient_errors {
                        return Err(PollError::Transport {
                            attempts: transient_errors,
                            reason,
                        });
                    }
                    warn!(job = %job_id, transient_errors, %reason, "status call failed, retrying");
                    sleep(self.config.transient_interval()).await;
                }
                Err(StatusError::NotFound(id)) => return Err(PollError::NotFound(id)),
                Err(StatusError::Fatal(reason)) => return Err(PollError::Fatal(reason)),
            }
        }
    }
}
