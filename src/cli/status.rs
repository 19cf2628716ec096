use anyhow::Result;
use clap::Args;
use skuflow_core_types::{JobId, RequestContext};
use skuflow_scheduler::JobStatusView;

use crate::cli::context::CliContext;
use crate::cli::output::emit;
use crate::client::ApiClient;

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// Job identifier returned by `submit`
    pub job_id: String,

    /// Server base URL (defaults to the configured server address)
    #[arg(long)]
    pub server: Option<String>,
}

pub async fn cmd_status(args: StatusArgs, ctx: &CliContext) -> Result<()> {
    let base_url = args
        .server
        .unwrap_or_else(|| ctx.config().server.base_url());
    let client = ApiClient::new(base_url, RequestContext::anonymous())?;
    let view = client.status(&JobId(args.job_id)).await?;
    emit(ctx.output(), &view, render_status)
}

pub(crate) fn render_status(view: &JobStatusView) -> String {
    let mut lines = vec![format!("status: {}", view.status)];
    if let Some(error) = &view.error {
        lines.push(format!("error:  {error}"));
    }
    if let Some(result) = &view.result {
        let succeeded = result["succeeded"].as_u64().unwrap_or(0);
        let failed = result["failed"].as_u64().unwrap_or(0);
        lines.push(format!("runs:   {succeeded} succeeded, {failed} failed"));
    }
    lines.join("\n")
}
