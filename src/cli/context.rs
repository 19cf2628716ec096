use crate::config::AppConfig;

use super::output::OutputFormat;

pub struct CliContext {
    config: AppConfig,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: AppConfig, output: OutputFormat) -> Self {
        Self { config, output }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
