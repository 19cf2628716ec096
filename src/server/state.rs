use std::sync::Arc;
use std::time::Instant;

use action_flow::{ActionDriver, DefaultFlowExecutor};
use skuflow_scheduler::{FlowCatalog, JobManager, JobService, SchedulerRuntime};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobService>,
    pub catalog: Arc<FlowCatalog>,
    pub health: Arc<ServeHealth>,
}

impl AppState {
    pub fn new(jobs: Arc<dyn JobService>, catalog: Arc<FlowCatalog>) -> Self {
        Self {
            jobs,
            catalog,
            health: Arc::new(ServeHealth::new()),
        }
    }

    /// Wire the scheduler, engine and catalogue around one driver.
    pub fn from_config(config: &AppConfig, driver: Arc<dyn ActionDriver>) -> Self {
        let runtime = Arc::new(SchedulerRuntime::new(config.scheduler.clone()));
        let executor = DefaultFlowExecutor::new(driver).with_config(config.engine.clone());
        let jobs = Arc::new(JobManager::new(Arc::clone(&runtime), Arc::new(executor)));
        let catalog = Arc::new(FlowCatalog::new(runtime));
        Self::new(jobs, catalog)
    }
}

pub struct ServeHealth {
    started: Instant,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ServeHealth {
    fn default() -> Self {
        Self::new()
    }
}
