use std::fmt;

use action_flow::{FlowDocument, FlowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skuflow_core_types::{FlowId, JobId, RequestContext};

/// Job lifecycle status. Only ever moves forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `queued -> started -> completed|failed`; a queued job may also fail
    /// directly when it never gets to run.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Started)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Started, JobStatus::Completed)
                | (JobStatus::Started, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an execution request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub skus: Vec<Value>,
    #[serde(default)]
    pub flows: Vec<FlowDocument>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Wire shape of a job status query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusView {
    pub fn pending(status: JobStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
        }
    }
}

/// One execution instance of flows against target entities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub flow_refs: Vec<FlowId>,
    pub sku_refs: Vec<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: RequestContext,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn queued(
        id: JobId,
        flow_refs: Vec<FlowId>,
        sku_refs: Vec<String>,
        context: RequestContext,
    ) -> Self {
        Self {
            id,
            flow_refs,
            sku_refs,
            status: JobStatus::Queued,
            result: None,
            error: None,
            context,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Outcome of one (flow, sku) unit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub flow_index: usize,
    pub sku_index: usize,
    pub sku: String,
    #[serde(flatten)]
    pub outcome: FlowResult,
}

/// Aggregated payload attached to a finished job
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub runs: Vec<RunReport>,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobResult {
    /// Collect-all aggregation; `runs` must be in submission order.
    pub fn from_runs(runs: Vec<RunReport>) -> Self {
        let succeeded = runs.iter().filter(|run| run.outcome.success).count();
        let failed = runs.len() - succeeded;
        Self {
            runs,
            succeeded,
            failed,
        }
    }

    /// Message of the first failed run in submission order.
    pub fn headline_error(&self) -> Option<String> {
        self.runs.iter().find(|run| !run.outcome.success).map(|run| {
            let cause = run
                .outcome
                .error
                .clone()
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| "flow did not complete".to_string());
            format!(
                "flow '{}' failed for sku '{}': {}",
                run.outcome.flow_name, run.sku, cause
            )
        })
    }
}

/// Search string handed to `enter_string` for one target entity.
///
/// Strings are used as-is; objects contribute their `sku`, `name` or `id`
/// field, in that order.
pub fn sku_search_term(sku: &Value) -> String {
    match sku {
        Value::String(text) => text.clone(),
        Value::Object(fields) => ["sku", "name", "id"]
            .iter()
            .find_map(|key| match fields.get(*key) {
                Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
                Some(Value::Number(number)) => Some(number.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| sku.to_string()),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Jobs allowed in `started` at once; others wait in `queued`
    pub max_running_jobs: usize,
    /// Concurrent (flow, sku) units inside one job
    pub unit_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_running_jobs: 4,
            unit_concurrency: 4,
        }
    }
}
