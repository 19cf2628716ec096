use std::path::PathBuf;
use std::sync::Arc;

use action_flow::{
    ActionDriver, DefaultFlowExecutor, Flow, FlowDocument, FlowExecutor, FlowResult,
    PageFixture, ScriptedDriver, ValidationError, ValidationIssue,
};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use skuflow_scheduler::model::sku_search_term;
use skuflow_scheduler::{validate_request, ExecutionRequest};
use tracing::{debug, info};

use crate::cli::context::CliContext;
use crate::cli::input::read_document;
use crate::cli::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Flow document or execution request (JSON or YAML)
    pub file: PathBuf,

    /// Run the validated flows against an offline scripted page
    #[arg(long)]
    pub dry_run: bool,

    /// Page fixture for the dry run (defaults to a page where every step resolves)
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// SKU search term for the dry run (repeatable)
    #[arg(long = "sku", value_name = "SKU")]
    pub skus: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    flows: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    runs: Vec<FlowResult>,
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext) -> Result<()> {
    let document: Value = read_document(&args.file).await?;
    let is_request = document.get("flows").is_some();

    let parsed = if is_request {
        let request: ExecutionRequest = serde_json::from_value(document)?;
        validate_request(&request).map(|flows| (flows, request.skus))
    } else {
        let document: FlowDocument = serde_json::from_value(document)?;
        Flow::from_document(document).map(|flow| (vec![flow], Vec::new()))
    };

    let (flows, mut skus) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return reject(ctx, &args, err),
    };
    info!(file = %args.file.display(), flows = flows.len(), "document is valid");

    let mut report = ValidationReport {
        valid: true,
        flows: flows.iter().map(|flow| flow.name().to_string()).collect(),
        issues: Vec::new(),
        runs: Vec::new(),
    };

    if args.dry_run {
        skus.extend(args.skus.iter().cloned().map(Value::String));
        if skus.is_empty() {
            skus.push(Value::String(String::new()));
        }
        let fixture = match args.fixture.as_ref().or(ctx.config().driver.fixture.as_ref()) {
            Some(path) => Some(read_document::<PageFixture>(path).await?),
            None => None,
        };
        report.runs = dry_run(ctx, &flows, &skus, fixture).await;
    }

    emit(ctx.output(), &report, render_report)?;

    let failed = report.runs.iter().filter(|run| !run.success).count();
    if failed > 0 {
        bail!("{failed} of {} dry runs failed", report.runs.len());
    }
    Ok(())
}

fn reject(ctx: &CliContext, args: &ValidateArgs, err: ValidationError) -> Result<()> {
    let report = ValidationReport {
        valid: false,
        flows: Vec::new(),
        issues: err.issues().to_vec(),
        runs: Vec::new(),
    };
    emit(ctx.output(), &report, render_report)?;
    bail!(
        "{} has {} validation issue(s)",
        args.file.display(),
        err.issues().len()
    )
}

async fn dry_run(
    ctx: &CliContext,
    flows: &[Flow],
    skus: &[Value],
    fixture: Option<PageFixture>,
) -> Vec<FlowResult> {
    let mut runs = Vec::with_capacity(flows.len() * skus.len());
    for flow in flows {
        for sku in skus {
            // Fresh page per run so scripted failure counts do not leak between runs.
            let driver: Arc<dyn ActionDriver> = match &fixture {
                Some(fixture) => Arc::new(ScriptedDriver::from_fixture(fixture.clone())),
                None => Arc::new(ScriptedDriver::for_flow(flow)),
            };
            let executor =
                DefaultFlowExecutor::new(driver).with_config(ctx.config().engine.clone());
            let term = sku_search_term(sku);
            let result = executor.execute(flow, &term).await;
            debug!(flow = flow.name(), sku = %term, success = result.success, "dry run finished");
            runs.push(result);
        }
    }
    runs
}

pub(crate) fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_report(report: &ValidationReport) -> String {
    if !report.valid {
        return format!("invalid:\n{}", render_issues(&report.issues));
    }
    let mut lines = vec![format!("valid: {}", report.flows.join(", "))];
    for run in &report.runs {
        let status = match &run.error {
            None => "ok".to_string(),
            Some(error) => format!("failed: {error}"),
        };
        lines.push(format!(
            "  {} -> {} ({} advances, {} extracted)",
            run.flow_name,
            status,
            run.advances,
            run.extracted.len()
        ));
    }
    lines.join("\n")
}
