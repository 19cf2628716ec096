//! Interruption supervisor
//!
//! Arbitration layer between the main traversal and the flow's interruption
//! handlers. The engine reports an [`Observation`] after every action; the
//! supervisor picks at most one eligible interruption (first declared wins),
//! runs it under its retry policy and reports back whether traversal may
//! resume at the preserved cursor.

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::driver::{apply_action, ActionDriver};
use crate::errors::FlowError;
use crate::strategies::{BackoffPolicy, RetryDecision};
use crate::types::{FlowContext, Interruption, InterruptionRecord, TraversalCursor, TriggerOn};

/// What the engine saw after its last move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Navigation completed
    Loaded,
    /// An action succeeded without navigating
    Checkpoint,
    /// The last action raised a failure
    ActionFailed { reason: String },
}

impl Observation {
    fn matches(&self, trigger: TriggerOn) -> bool {
        match trigger {
            TriggerOn::OnError => matches!(self, Observation::ActionFailed { .. }),
            TriggerOn::OnLoad => matches!(self, Observation::Loaded),
            // Needs a page lookup; resolved by the supervisor.
            TriggerOn::OnElementFound => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Watching,
    Handling {
        interruption: usize,
        attempt: u32,
    },
    Resuming {
        interruption: usize,
        cursor: TraversalCursor,
    },
    Aborting {
        interruption: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutcome {
    /// No interruption was eligible
    Quiet,
    /// An interruption ran and traversal may resume
    Recovered(InterruptionRecord),
    /// The handler spent its retry budget
    Aborted(FlowError, InterruptionRecord),
}

pub struct InterruptionSupervisor<'a> {
    interruptions: &'a [Interruption],
    driver: &'a dyn ActionDriver,
    backoff: &'a dyn BackoffPolicy,
    state: SupervisorState,
}

impl<'a> InterruptionSupervisor<'a> {
    pub fn new(
        interruptions: &'a [Interruption],
        driver: &'a dyn ActionDriver,
        backoff: &'a dyn BackoffPolicy,
    ) -> Self {
        Self {
            interruptions,
            driver,
            backoff,
            state: SupervisorState::Watching,
        }
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// First-declared interruption eligible for `observation`.
    pub async fn select(&self, observation: &Observation) -> Option<usize> {
        for (position, interruption) in self.interruptions.iter().enumerate() {
            let eligible = match interruption.trigger {
                TriggerOn::OnElementFound => self.driver.element_present(&interruption.xpath).await,
                trigger => observation.matches(trigger),
            };
            if eligible {
                return Some(position);
            }
        }
        None
    }

    /// Evaluate triggers against `observation` and handle the winner.
    ///
    /// Holding `&mut FlowContext` for the whole call keeps the engine
    /// suspended while a handler runs.
    pub async fn observe(
        &mut self,
        observation: &Observation,
        cursor: TraversalCursor,
        step: &str,
        context: &mut FlowContext,
    ) -> SupervisorOutcome {
        match self.state {
            SupervisorState::Watching => {}
            // A new observation means the engine moved on from the last recovery.
            SupervisorState::Resuming { .. } => self.state = SupervisorState::Watching,
            _ => return SupervisorOutcome::Quiet,
        }
        let Some(position) = self.select(observation).await else {
            return SupervisorOutcome::Quiet;
        };
        let interruptions = self.interruptions;
        let interruption = &interruptions[position];
        info!(
            interruption = %interruption.name,
            trigger = %interruption.trigger,
            step,
            "interruption fired"
        );

        let mut record = InterruptionRecord {
            name: interruption.name.clone(),
            trigger: interruption.trigger,
            step: step.to_string(),
            cursor,
            executions: 0,
            recovered: false,
            error: None,
        };

        let mut attempt = 0;
        loop {
            self.state = SupervisorState::Handling {
                interruption: position,
                attempt,
            };
            record.executions += 1;

            // A failed attempt must not leave partial collection behind.
            let snapshot = context.clone();
            let reason = match self.run_handler(interruption, context).await {
                Ok(()) => {
                    self.state = SupervisorState::Resuming {
                        interruption: position,
                        cursor,
                    };
                    debug!(interruption = %interruption.name, ?cursor, "resuming traversal");
                    record.recovered = true;
                    return SupervisorOutcome::Recovered(record);
                }
                Err(reason) => {
                    *context = snapshot;
                    reason
                }
            };

            attempt += 1;
            match self.backoff.decide(&interruption.retry, attempt) {
                RetryDecision::Delay(delay) => {
                    warn!(
                        interruption = %interruption.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "interruption handler failed, retrying"
                    );
                    sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    warn!(
                        interruption = %interruption.name,
                        executions = record.executions,
                        %reason,
                        "interruption retries exhausted"
                    );
                    self.state = SupervisorState::Aborting {
                        interruption: position,
                    };
                    record.error = Some(reason.clone());
                    let error = FlowError::RetriesExhausted {
                        interruption: interruption.name.clone(),
                        attempts: interruption.retry.attempts,
                        reason,
                    };
                    return SupervisorOutcome::Aborted(error, record);
                }
            }
        }
    }

    /// Acknowledge a recovery and hand back the cursor traversal resumes at.
    pub fn resume(&mut self) -> Option<TraversalCursor> {
        match self.state {
            SupervisorState::Resuming { cursor, .. } => {
                self.state = SupervisorState::Watching;
                Some(cursor)
            }
            _ => None,
        }
    }

    async fn run_handler(
        &self,
        interruption: &Interruption,
        context: &mut FlowContext,
    ) -> Result<(), String> {
        for action in &interruption.actions {
            apply_action(self.driver, *action, &interruption.xpath, context)
                .await
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}
