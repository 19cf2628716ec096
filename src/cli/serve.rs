use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_flow::{ActionDriver, NoopDriver, PageFixture, ScriptedDriver};
use anyhow::{Context, Result};
use clap::Args;
use skuflow_scheduler::JobService;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::input::read_document;
use crate::server::{build_router, AppState};

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Interface to bind (defaults to server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (defaults to server.port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Page fixture for the scripted driver (defaults to driver.fixture)
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let fixture = args.fixture.or_else(|| config.driver.fixture.clone());
    let driver = build_driver(fixture.as_deref()).await?;
    let state = AppState::from_config(&config, driver);
    let jobs = Arc::clone(&state.jobs);
    let app = build_router(state);

    let addr = config
        .server
        .socket_addr()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        max_running_jobs = config.scheduler.max_running_jobs,
        unit_concurrency = config.scheduler.unit_concurrency,
        "skuflow server listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            jobs.shutdown();
        })
        .await
        .context("server exited with error")?;
    Ok(())
}

/// Scripted page when a fixture is given, otherwise a driver that accepts everything.
pub async fn build_driver(fixture: Option<&Path>) -> Result<Arc<dyn ActionDriver>> {
    match fixture {
        Some(path) => {
            let fixture: PageFixture = read_document(path).await?;
            info!(
                path = %path.display(),
                elements = fixture.elements.len(),
                "using scripted page fixture"
            );
            Ok(Arc::new(ScriptedDriver::from_fixture(fixture)))
        }
        None => {
            warn!("no page fixture configured; actions run against the no-op driver");
            Ok(Arc::new(NoopDriver))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
