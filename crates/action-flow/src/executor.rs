//! Flow executor implementation

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::driver::{apply_action, ActionDriver};
use crate::errors::FlowError;
use crate::strategies::{BackoffPolicy, DeterministicBackoff};
use crate::supervisor::{InterruptionSupervisor, Observation, SupervisorOutcome};
use crate::types::*;

/// Flow executor trait
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Run `flow` to a terminal state against one target entity.
    ///
    /// Failures are reported inside the returned [`FlowResult`].
    async fn execute(&self, flow: &Flow, input: &str) -> FlowResult;
}

/// Engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recoveries allowed for failed actions within one step
    pub max_recoveries_per_step: u32,
    /// Deadline for a whole traversal
    pub flow_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recoveries_per_step: 3,
            flow_timeout_ms: None,
        }
    }
}

/// Default flow executor implementation
pub struct DefaultFlowExecutor {
    driver: Arc<dyn ActionDriver>,
    backoff: Arc<dyn BackoffPolicy>,
    config: EngineConfig,
}

impl DefaultFlowExecutor {
    pub fn new(driver: Arc<dyn ActionDriver>) -> Self {
        Self {
            driver,
            backoff: Arc::new(DeterministicBackoff::new()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[async_trait]
impl FlowExecutor for DefaultFlowExecutor {
    async fn execute(&self, flow: &Flow, input: &str) -> FlowResult {
        info!(flow = %flow.name(), flow_id = %flow.id(), input, "starting flow");

        let mut traversal = Traversal {
            flow,
            driver: self.driver.as_ref(),
            supervisor: InterruptionSupervisor::new(
                flow.interruptions(),
                self.driver.as_ref(),
                self.backoff.as_ref(),
            ),
            config: &self.config,
            context: FlowContext::new(input),
            result: FlowResult::new(flow),
            visited: HashSet::new(),
        };

        let outcome = match self.config.flow_timeout_ms {
            Some(limit) => match timeout(Duration::from_millis(limit), traversal.run()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FlowError::Timeout(limit)),
            },
            None => traversal.run().await,
        };

        let Traversal {
            context, result, ..
        } = traversal;
        let result = result.with_collected(context);
        let result = match outcome {
            Ok(()) => result.with_success(),
            Err(error) => {
                warn!(flow = %flow.name(), kind = error.kind(), %error, "flow failed");
                result.with_failure(error)
            }
        }
        .finish();

        info!(
            flow = %flow.name(),
            success = result.success,
            advances = result.advances,
            latency_ms = result.latency_ms,
            "flow finished"
        );
        result
    }
}

/// Engine states. Terminal carries the outcome.
enum EngineState {
    Entry,
    Executing(usize),
    Advancing(usize, StepResult),
    Terminal(Result<(), FlowError>),
}

/// One in-flight traversal: cursor state lives here, not on the call stack.
struct Traversal<'a> {
    flow: &'a Flow,
    driver: &'a dyn ActionDriver,
    supervisor: InterruptionSupervisor<'a>,
    config: &'a EngineConfig,
    context: FlowContext,
    result: FlowResult,
    visited: HashSet<usize>,
}

impl<'a> Traversal<'a> {
    async fn run(&mut self) -> Result<(), FlowError> {
        let flow = self.flow;
        let mut state = EngineState::Entry;

        loop {
            state = match state {
                EngineState::Entry => self.enter().await,

                EngineState::Executing(position) => {
                    let step = &flow.steps()[position];
                    self.visited.insert(position);
                    self.result.visited.push(step.xpath.clone());
                    debug!(step = %step.xpath, position, "executing step");

                    let mut report = StepResult::new(step.xpath.as_str());
                    match self
                        .run_actions(TraversalCursor::at_step(position), &step.actions, &step.xpath, &mut report)
                        .await
                    {
                        Ok(()) => EngineState::Advancing(position, report),
                        Err(error) => {
                            self.result
                                .step_results
                                .push(report.with_error(error.to_string()).finish());
                            EngineState::Terminal(Err(error))
                        }
                    }
                }

                EngineState::Advancing(position, mut report) => {
                    let step = &flow.steps()[position];
                    let outcome = self.advance(position, step, &mut report).await;
                    let report = match &outcome {
                        Ok(_) => report.with_success(),
                        Err(error) => report.with_error(error.to_string()),
                    };
                    self.result.step_results.push(report.finish());
                    self.result.advances += 1;

                    match outcome {
                        Ok(Some(target)) => EngineState::Executing(target),
                        Ok(None) => EngineState::Terminal(Ok(())),
                        Err(error) => EngineState::Terminal(Err(error)),
                    }
                }

                EngineState::Terminal(outcome) => return outcome,
            };
        }
    }

    async fn enter(&mut self) -> EngineState {
        let flow = self.flow;
        let entry = flow.entry_index();

        if !flow.url().is_empty() {
            if let Err(err) = self.driver.open(flow.url()).await {
                return EngineState::Terminal(Err(err.into()));
            }
            let cursor = TraversalCursor::at_step(entry);
            let step = flow.steps()[entry].xpath.as_str();
            if let Err(error) = self.supervise(&Observation::Loaded, cursor, step).await {
                return EngineState::Terminal(Err(error));
            }
        }
        EngineState::Executing(entry)
    }

    /// Resolve the successor and run transition actions.
    ///
    /// `Ok(None)` means the step was the last one.
    async fn advance(
        &mut self,
        position: usize,
        step: &'a Step,
        report: &mut StepResult,
    ) -> Result<Option<usize>, FlowError> {
        let Some(next) = &step.next else {
            return Ok(None);
        };
        let target = self
            .flow
            .step_index(&next.xpath)
            .ok_or_else(|| FlowError::DanglingReference {
                from: step.xpath.clone(),
                target: next.xpath.clone(),
            })?;
        if self.visited.contains(&target) {
            return Err(FlowError::CyclicFlow {
                locator: next.xpath.clone(),
            });
        }

        self.run_actions(TraversalCursor::transition(position), &next.actions, &next.xpath, report)
            .await?;
        Ok(Some(target))
    }

    /// Execute an action list from `cursor`, letting the supervisor interleave.
    async fn run_actions(
        &mut self,
        mut cursor: TraversalCursor,
        actions: &[Action],
        locator: &str,
        report: &mut StepResult,
    ) -> Result<(), FlowError> {
        let mut recoveries = 0u32;

        while cursor.action < actions.len() {
            let action = actions[cursor.action];
            match apply_action(self.driver, action, locator, &mut self.context).await {
                Ok(outcome) => {
                    report.actions_run += 1;
                    let observation = if outcome.navigated {
                        Observation::Loaded
                    } else {
                        Observation::Checkpoint
                    };
                    self.supervise(&observation, cursor, locator).await?;
                    cursor.action += 1;
                }
                Err(err) => {
                    let reason = err.to_string();
                    debug!(%action, locator, %reason, "action failed");
                    if recoveries >= self.config.max_recoveries_per_step {
                        return Err(FlowError::StepFailed {
                            locator: locator.to_string(),
                            reason: format!(
                                "{reason} (recovery budget of {} spent)",
                                self.config.max_recoveries_per_step
                            ),
                        });
                    }

                    let observation = Observation::ActionFailed {
                        reason: reason.clone(),
                    };
                    if !self.supervise(&observation, cursor, locator).await? {
                        return Err(FlowError::StepFailed {
                            locator: locator.to_string(),
                            reason,
                        });
                    }
                    // Re-run the failed action at the preserved cursor.
                    recoveries += 1;
                    report.recoveries += 1;
                }
            }
        }
        Ok(())
    }

    /// Hand an observation to the supervisor; `Ok(true)` when a handler ran.
    async fn supervise(
        &mut self,
        observation: &Observation,
        cursor: TraversalCursor,
        locator: &str,
    ) -> Result<bool, FlowError> {
        match self
            .supervisor
            .observe(observation, cursor, locator, &mut self.context)
            .await
        {
            SupervisorOutcome::Quiet => Ok(false),
            SupervisorOutcome::Recovered(record) => {
                self.result.interruptions.push(record);
                self.supervisor.resume();
                Ok(true)
            }
            SupervisorOutcome::Aborted(error, record) => {
                self.result.interruptions.push(record);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{NoopDriver, ScriptedDriver};
    use crate::strategies::ImmediateBackoff;

    fn flow(value: serde_json::Value) -> Flow {
        serde_json::from_value(value).unwrap()
    }

    fn executor(driver: ScriptedDriver) -> DefaultFlowExecutor {
        DefaultFlowExecutor::new(Arc::new(driver)).with_backoff(Arc::new(ImmediateBackoff))
    }

    #[tokio::test]
    async fn test_single_step_flow() {
        let flow = flow(serde_json::json!({
            "name": "one",
            "steps": [{ "xpath": "//a", "actions": ["scroll_view"] }]
        }));
        let result = DefaultFlowExecutor::new(Arc::new(NoopDriver))
            .execute(&flow, "sku")
            .await;
        assert!(result.success);
        assert_eq!(result.advances, 1);
        assert_eq!(result.step_results.len(), 1);
        assert_eq!(result.step_results[0].actions_run, 1);
    }

    #[tokio::test]
    async fn test_entry_uses_start_trigger() {
        let flow = flow(serde_json::json!({
            "name": "entry",
            "steps": [
                { "xpath": "//skipped", "actions": ["strong_click"] },
                { "xpath": "//start", "actions": ["strong_click"], "start_trigger": true }
            ]
        }));
        let result = executor(ScriptedDriver::for_flow(&flow))
            .execute(&flow, "")
            .await;
        assert!(result.success);
        assert_eq!(result.visited, vec!["//start".to_string()]);
    }

    #[tokio::test]
    async fn test_transition_actions_run_against_next_locator() {
        let flow = flow(serde_json::json!({
            "name": "transition",
            "steps": [
                { "xpath": "//a", "actions": ["strong_click"], "next": { "xpath": "//b", "actions": ["scroll_view"] } },
                { "xpath": "//b", "actions": ["print_text"] }
            ]
        }));
        let driver = ScriptedDriver::for_flow(&flow).with_text("//b", "hello");
        let result = executor(driver.clone()).execute(&flow, "").await;

        assert!(result.success);
        assert_eq!(
            driver.performed(),
            vec![
                (Action::StrongClick, "//a".to_string()),
                (Action::ScrollView, "//b".to_string()),
                (Action::PrintText, "//b".to_string()),
            ]
        );
        assert_eq!(result.extracted, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_without_interruption_is_fatal() {
        let flow = flow(serde_json::json!({
            "name": "fatal",
            "steps": [{ "xpath": "//a", "actions": ["strong_click"] }]
        }));
        let driver = ScriptedDriver::for_flow(&flow).fail_times("//a", Action::StrongClick, 1);
        let result = executor(driver).execute(&flow, "").await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("step_failed"));
        assert!(matches!(result.failure, Some(FlowError::StepFailed { .. })));
        assert_eq!(result.advances, 0);
    }

    #[tokio::test]
    async fn test_recovery_budget_bounds_reexecution() {
        let flow = flow(serde_json::json!({
            "name": "budget",
            "steps": [{ "xpath": "//a", "actions": ["strong_click"] }],
            "interruptions": [{
                "name": "dismiss",
                "xpath": "//close",
                "actions": ["scroll_view"],
                "trigger": { "on": "on_error" }
            }]
        }));
        let driver = ScriptedDriver::for_flow(&flow)
            .with_element("//close")
            .fail_always("//a", Action::StrongClick);
        let result = executor(driver)
            .with_config(EngineConfig {
                max_recoveries_per_step: 2,
                flow_timeout_ms: None,
            })
            .execute(&flow, "")
            .await;

        assert!(!result.success);
        assert_eq!(result.interruptions.len(), 2);
        assert_eq!(result.step_results[0].recoveries, 2);
        assert!(result.error.unwrap().contains("recovery budget"));
    }

    #[tokio::test]
    async fn test_on_load_fires_after_open() {
        let flow = flow(serde_json::json!({
            "name": "cookies",
            "url": "https://shop.example",
            "steps": [{ "xpath": "//a", "actions": [] }],
            "interruptions": [{
                "name": "cookie-banner",
                "xpath": "//accept",
                "actions": ["strong_click"],
                "trigger": { "on": "on_load" }
            }]
        }));
        let driver = ScriptedDriver::for_flow(&flow).with_element("//accept");
        let result = executor(driver.clone()).execute(&flow, "").await;

        assert!(result.success);
        assert_eq!(result.interruptions[0].name, "cookie-banner");
        assert_eq!(
            driver.calls()[0],
            crate::driver::DriverCall::Open("https://shop.example".to_string())
        );
    }

    #[tokio::test]
    async fn test_open_failure_is_driver_error() {
        let flow = flow(serde_json::json!({
            "name": "offline",
            "url": "https://shop.example",
            "steps": [{ "xpath": "//a", "actions": [] }]
        }));
        let driver = ScriptedDriver::for_flow(&flow).fail_open("dns");
        let result = executor(driver).execute(&flow, "").await;
        assert_eq!(result.error_kind.as_deref(), Some("driver_error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_timeout() {
        let flow = flow(serde_json::json!({
            "name": "slow",
            "steps": [{ "xpath": "//a", "actions": ["strong_click"] }],
            "interruptions": [{
                "name": "wait-it-out",
                "xpath": "//never",
                "actions": ["strong_click"],
                "trigger": { "on": "on_error" },
                "retry": { "attempts": 5, "delay_ms": 60000, "strategy": "exponential" }
            }]
        }));
        let driver = ScriptedDriver::for_flow(&flow).fail_always("//a", Action::StrongClick);
        let result = DefaultFlowExecutor::new(Arc::new(driver))
            .with_config(EngineConfig {
                max_recoveries_per_step: 3,
                flow_timeout_ms: Some(1_000),
            })
            .execute(&flow, "")
            .await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FlowError::Timeout(1_000)));
    }
}
