use once_cell::sync::OnceCell;
use prometheus::{core::Collector, IntCounterVec, IntGauge, Opts, Registry};
use tracing::error;

static JOBS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static FLOW_RUNS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static INTERRUPTIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static JOBS_RUNNING: OnceCell<IntGauge> = OnceCell::new();

fn register<C>(registry: &Registry, cell: &OnceCell<C>, build: impl FnOnce() -> prometheus::Result<C>)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    let collector = match cell.get() {
        Some(existing) => existing.clone(),
        None => match build() {
            Ok(created) => cell.get_or_init(|| created).clone(),
            Err(err) => {
                error!(?err, "failed to create scheduler metric");
                return;
            }
        },
    };
    if let Err(err) = registry.register(Box::new(collector)) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register scheduler metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, &JOBS_TOTAL, || {
        IntCounterVec::new(
            Opts::new("skuflow_jobs_total", "Jobs grouped by lifecycle event"),
            &["event"],
        )
    });
    register(registry, &FLOW_RUNS_TOTAL, || {
        IntCounterVec::new(
            Opts::new(
                "skuflow_flow_runs_total",
                "Flow traversals grouped by outcome",
            ),
            &["outcome"],
        )
    });
    register(registry, &INTERRUPTIONS_TOTAL, || {
        IntCounterVec::new(
            Opts::new(
                "skuflow_interruptions_total",
                "Interruption activations grouped by result",
            ),
            &["result"],
        )
    });
    register(registry, &JOBS_RUNNING, || {
        IntGauge::new("skuflow_jobs_running", "Jobs currently in the started state")
    });
}

fn record_job(event: &str) {
    if let Some(counter) = JOBS_TOTAL.get() {
        counter.with_label_values(&[event]).inc();
    }
}

pub fn record_submitted() {
    record_job("submitted");
}

pub fn record_rejected() {
    record_job("rejected");
}

pub fn record_started() {
    record_job("started");
    if let Some(gauge) = JOBS_RUNNING.get() {
        gauge.inc();
    }
}

pub fn record_finished(completed: bool) {
    record_job(if completed { "completed" } else { "failed" });
    if let Some(gauge) = JOBS_RUNNING.get() {
        gauge.dec();
    }
}

/// `outcome` is `success` or a flow error kind.
pub fn record_flow_run(outcome: &str) {
    if let Some(counter) = FLOW_RUNS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_interruption(recovered: bool) {
    if let Some(counter) = INTERRUPTIONS_TOTAL.get() {
        counter
            .with_label_values(&[if recovered { "recovered" } else { "exhausted" }])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_once_per_registry() {
        let registry = Registry::new();
        register_metrics(&registry);
        register_metrics(&registry);
        record_submitted();
        record_flow_run("success");

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"skuflow_jobs_total".to_string()));
        assert!(names.contains(&"skuflow_flow_runs_total".to_string()));
    }
}
