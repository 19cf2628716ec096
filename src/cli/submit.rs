use std::path::PathBuf;
use std::sync::Arc;

use action_flow::FlowDocument;
use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;
use skuflow_core_types::{PlanTier, RequestContext};
use skuflow_scheduler::{
    validate_request, ExecutionRequest, JobPoller, PollOutcome, SubmitResponse,
};
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::input::read_document;
use crate::cli::output::emit;
use crate::cli::validate::render_issues;
use crate::client::{ApiClient, HttpStatusSource};

#[derive(Args, Clone, Debug)]
pub struct SubmitArgs {
    /// Execution request file (`{ skus, flows }`)
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Flow document to add to the request (repeatable)
    #[arg(long = "flow", value_name = "FILE")]
    pub flows: Vec<PathBuf>,

    /// SKU search term to add to the request (repeatable)
    #[arg(long = "sku", value_name = "SKU")]
    pub skus: Vec<String>,

    /// Poll until the job finishes or the poll budget runs out
    #[arg(long)]
    pub wait: bool,

    /// Override poll.max_polls
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Server base URL (defaults to the configured server address)
    #[arg(long)]
    pub server: Option<String>,

    #[arg(long, default_value = "cli")]
    pub tenant: String,

    #[arg(long, default_value = "free")]
    pub plan: PlanTier,
}

pub async fn cmd_submit(args: SubmitArgs, ctx: &CliContext) -> Result<()> {
    let mut request = match &args.request {
        Some(path) => read_document::<ExecutionRequest>(path).await?,
        None => ExecutionRequest::default(),
    };
    for path in &args.flows {
        request.flows.push(read_document::<FlowDocument>(path).await?);
    }
    request
        .skus
        .extend(args.skus.iter().cloned().map(Value::String));

    if let Err(err) = validate_request(&request) {
        eprintln!("{}", render_issues(err.issues()));
        bail!("request rejected with {} validation issue(s)", err.issues().len());
    }

    let base_url = args
        .server
        .clone()
        .unwrap_or_else(|| ctx.config().server.base_url());
    let client = ApiClient::new(base_url, RequestContext::new(args.tenant.clone(), args.plan))?;
    let job_id = client.submit(&request).await?;
    info!(job = %job_id, server = client.base_url(), "job accepted");

    if !args.wait {
        let accepted = SubmitResponse { job_id };
        return emit(ctx.output(), &accepted, |r| format!("job_id: {}", r.job_id));
    }

    let mut poll = ctx.config().poll.clone();
    if let Some(max_polls) = args.max_polls {
        poll.max_polls = max_polls;
    }
    let poller = JobPoller::new(Arc::new(HttpStatusSource::new(client)), poll);
    let outcome = poller.wait(&job_id).await?;
    emit(ctx.output(), &outcome, |outcome| render_outcome(&job_id.to_string(), outcome))?;

    match outcome {
        PollOutcome::Completed { .. } => Ok(()),
        PollOutcome::Failed { error } => bail!("job {job_id} failed: {error}"),
        PollOutcome::Timeout { polls, .. } => {
            bail!("job {job_id} still running after {polls} polls")
        }
    }
}

fn render_outcome(job_id: &str, outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::Completed { result } => {
            let summary = result
                .as_ref()
                .map(|result| {
                    format!(
                        " ({} succeeded, {} failed)",
                        result["succeeded"].as_u64().unwrap_or(0),
                        result["failed"].as_u64().unwrap_or(0)
                    )
                })
                .unwrap_or_default();
            format!("job {job_id} completed{summary}")
        }
        PollOutcome::Failed { error } => format!("job {job_id} failed: {error}"),
        PollOutcome::Timeout { polls, last_status } => format!(
            "job {job_id} timed out after {polls} polls (last status: {})",
            last_status.map_or("unknown", |status| status.as_str())
        ),
    }
}
