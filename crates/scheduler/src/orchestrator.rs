use std::sync::Arc;

use action_flow::{Flow, FlowExecutor};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use skuflow_core_types::JobId;

use crate::metrics;
use crate::model::{sku_search_term, JobResult, RunReport};
use crate::runtime::SchedulerRuntime;

/// Spawns one worker task per job.
pub struct Orchestrator<E>
where
    E: FlowExecutor + 'static,
{
    runtime: Arc<SchedulerRuntime>,
    executor: Arc<E>,
}

impl<E> Orchestrator<E>
where
    E: FlowExecutor + 'static,
{
    pub fn new(runtime: Arc<SchedulerRuntime>, executor: Arc<E>) -> Self {
        Self { runtime, executor }
    }

    /// Start the worker for an already queued job and return immediately.
    pub fn launch(&self, job_id: JobId, flows: Vec<Flow>, skus: Vec<Value>) -> JoinHandle<()> {
        let runtime = Arc::clone(&self.runtime);
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let slots = runtime.running_slots();
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    if let Err(err) = runtime.fail(&job_id, "scheduler is shutting down", None) {
                        warn!(job = %job_id, %err, "could not fail queued job");
                    }
                    return;
                }
            };

            if let Err(err) = runtime.mark_started(&job_id) {
                warn!(job = %job_id, %err, "job could not start");
                return;
            }
            metrics::record_started();
            info!(job = %job_id, flows = flows.len(), skus = skus.len(), "job started");

            let concurrency = runtime.config().unit_concurrency.max(1);
            // Run units on their own task so a panicking executor still
            // leaves the job in a terminal state.
            let units = tokio::spawn(run_units(executor, flows, skus, concurrency));
            match units.await {
                Ok(result) => finalize(&runtime, &job_id, result),
                Err(join_err) => {
                    error!(job = %job_id, %join_err, "job worker crashed");
                    metrics::record_finished(false);
                    if let Err(err) =
                        runtime.fail(&job_id, format!("job worker crashed: {join_err}"), None)
                    {
                        warn!(job = %job_id, %err, "could not record crash");
                    }
                }
            }
        })
    }
}

/// Execute every (flow, sku) unit; reports come back in submission order.
async fn run_units<E>(
    executor: Arc<E>,
    flows: Vec<Flow>,
    skus: Vec<Value>,
    concurrency: usize,
) -> JobResult
where
    E: FlowExecutor + 'static,
{
    let terms: Vec<String> = skus.iter().map(sku_search_term).collect();
    let units: Vec<(usize, usize)> = (0..flows.len())
        .flat_map(|flow_index| (0..terms.len()).map(move |sku_index| (flow_index, sku_index)))
        .collect();

    let flows = &flows;
    let terms = &terms;
    let executor = &executor;
    let runs: Vec<RunReport> = stream::iter(units)
        .map(|(flow_index, sku_index)| async move {
            let sku = &terms[sku_index];
            let outcome = executor.execute(&flows[flow_index], sku).await;
            metrics::record_flow_run(if outcome.success {
                "success"
            } else {
                outcome.error_kind.as_deref().unwrap_or("unknown")
            });
            for record in &outcome.interruptions {
                metrics::record_interruption(record.recovered);
            }
            RunReport {
                flow_index,
                sku_index,
                sku: sku.clone(),
                outcome,
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    JobResult::from_runs(runs)
}

fn finalize(runtime: &SchedulerRuntime, job_id: &JobId, result: JobResult) {
    let headline = result.headline_error();
    let (succeeded, failed) = (result.succeeded, result.failed);
    let payload = match serde_json::to_value(&result) {
        Ok(payload) => payload,
        Err(err) => {
            metrics::record_finished(false);
            if let Err(err) = runtime.fail(job_id, format!("failed to encode job result: {err}"), None) {
                warn!(job = %job_id, %err, "could not record encoding failure");
            }
            return;
        }
    };

    let outcome = match headline {
        None => runtime.complete(job_id, payload),
        Some(message) => runtime.fail(job_id, message, Some(payload)),
    };
    match outcome {
        Ok(job) => {
            metrics::record_finished(failed == 0);
            info!(job = %job_id, status = %job.status, succeeded, failed, "job finished");
        }
        Err(err) => warn!(job = %job_id, %err, "could not record job outcome"),
    }
}
