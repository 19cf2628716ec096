//! Action driver seam
//!
//! The engine never touches a browser directly. Every action is dispatched
//! through an [`ActionDriver`], which reports what happened on the page:
//! - the text under the locator, when there is one
//! - whether the action caused a navigation
//!
//! [`ScriptedDriver`] is an in-memory page model used for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Action, Flow, FlowContext};

/// What the page reported after one action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Text content of the element under the locator
    pub text: Option<String>,
    /// The action triggered a page load
    pub navigated: bool,
}

impl ActionOutcome {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            navigated: false,
        }
    }
}

/// Driver-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("{action} on '{locator}' failed: {reason}")]
    ActionFailed {
        action: Action,
        locator: String,
        reason: String,
    },

    #[error("navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },
}

/// Browser boundary
#[async_trait]
pub trait ActionDriver: Send + Sync {
    /// Load the flow's start page
    async fn open(&self, url: &str) -> Result<(), DriverError>;

    /// Perform one vocabulary action against `locator`
    async fn perform(
        &self,
        action: Action,
        locator: &str,
        input: &str,
    ) -> Result<ActionOutcome, DriverError>;

    /// Whether `locator` currently resolves on the page
    async fn element_present(&self, locator: &str) -> bool;
}

/// Driver that succeeds every call and sees no elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

#[async_trait]
impl ActionDriver for NoopDriver {
    async fn open(&self, _url: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn perform(
        &self,
        _action: Action,
        _locator: &str,
        _input: &str,
    ) -> Result<ActionOutcome, DriverError> {
        Ok(ActionOutcome::default())
    }

    async fn element_present(&self, _locator: &str) -> bool {
        false
    }
}

/// Run one action through the driver and apply its data-collection effect.
pub(crate) async fn apply_action(
    driver: &dyn ActionDriver,
    action: Action,
    locator: &str,
    context: &mut FlowContext,
) -> Result<ActionOutcome, DriverError> {
    let input = match action {
        Action::EnterString => context.input.as_str(),
        _ => "",
    };
    let outcome = driver.perform(action, locator, input).await?;

    match action {
        Action::PrintText => {
            let text = outcome.text.clone().unwrap_or_default();
            info!(locator, text = %text, "print_text");
            context.extracted.push(text);
        }
        Action::AddNext => {
            context
                .stack
                .push(outcome.text.clone().unwrap_or_default());
        }
        Action::AddToTable => {
            let mut row = context.stack.clone();
            if let Some(text) = &outcome.text {
                row.push(text.clone());
            }
            context.table.push(row);
        }
        Action::ClearStack => context.stack.clear(),
        Action::ScrollView | Action::StrongClick | Action::EnterString => {}
    }

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Scripted page model
// ---------------------------------------------------------------------------

/// Serializable description of a scripted page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageFixture {
    /// Locators that resolve when the page loads
    #[serde(default)]
    pub elements: Vec<String>,
    #[serde(default)]
    pub texts: HashMap<String, String>,
    #[serde(default)]
    pub failures: Vec<ScriptedFailure>,
    /// Actions that trigger a page load
    #[serde(default)]
    pub navigations: Vec<ScriptedEffect>,
    /// Actions that make their locator disappear (e.g. closing a popup)
    #[serde(default)]
    pub removals: Vec<ScriptedEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_failure: Option<String>,
}

/// Fail `action` (or any action when `None`) on `locator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedFailure {
    pub locator: String,
    #[serde(default)]
    pub action: Option<Action>,
    /// Number of failures before the action succeeds; `None` fails forever
    #[serde(default)]
    pub times: Option<u32>,
    #[serde(default = "default_failure_reason")]
    pub reason: String,
}

fn default_failure_reason() -> String {
    "scripted failure".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedEffect {
    pub locator: String,
    pub action: Action,
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Open(String),
    Perform {
        action: Action,
        locator: String,
        input: String,
    },
}

#[derive(Debug, Default)]
struct PageState {
    present: HashSet<String>,
    texts: HashMap<String, String>,
    failures: Vec<ScriptedFailure>,
    navigations: HashSet<(String, Action)>,
    removals: HashSet<(String, Action)>,
    open_failure: Option<String>,
    calls: Vec<DriverCall>,
}

impl PageState {
    fn take_failure(&mut self, action: Action, locator: &str) -> Option<String> {
        let rule = self.failures.iter_mut().find(|rule| {
            rule.locator == locator
                && rule.action.map_or(true, |a| a == action)
                && rule.times != Some(0)
        })?;
        if let Some(times) = rule.times.as_mut() {
            *times -= 1;
        }
        Some(rule.reason.clone())
    }
}

/// Deterministic in-memory driver.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<Mutex<PageState>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page where every step and transition locator of `flow` resolves.
    pub fn for_flow(flow: &Flow) -> Self {
        let driver = Self::new();
        {
            let mut state = driver.state.lock();
            for step in flow.steps() {
                state.present.insert(step.xpath.clone());
                if let Some(next) = &step.next {
                    state.present.insert(next.xpath.clone());
                }
            }
        }
        driver
    }

    pub fn from_fixture(fixture: PageFixture) -> Self {
        let state = PageState {
            present: fixture.elements.into_iter().collect(),
            texts: fixture.texts,
            failures: fixture.failures,
            navigations: fixture
                .navigations
                .into_iter()
                .map(|effect| (effect.locator, effect.action))
                .collect(),
            removals: fixture
                .removals
                .into_iter()
                .map(|effect| (effect.locator, effect.action))
                .collect(),
            open_failure: fixture.open_failure,
            calls: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_element(self, locator: impl Into<String>) -> Self {
        self.state.lock().present.insert(locator.into());
        self
    }

    /// Element with text content; also marks it present.
    pub fn with_text(self, locator: impl Into<String>, text: impl Into<String>) -> Self {
        let locator = locator.into();
        {
            let mut state = self.state.lock();
            state.present.insert(locator.clone());
            state.texts.insert(locator, text.into());
        }
        self
    }

    pub fn fail_times(self, locator: impl Into<String>, action: Action, times: u32) -> Self {
        self.state.lock().failures.push(ScriptedFailure {
            locator: locator.into(),
            action: Some(action),
            times: Some(times),
            reason: default_failure_reason(),
        });
        self
    }

    pub fn fail_always(self, locator: impl Into<String>, action: Action) -> Self {
        self.state.lock().failures.push(ScriptedFailure {
            locator: locator.into(),
            action: Some(action),
            times: None,
            reason: default_failure_reason(),
        });
        self
    }

    pub fn navigates_on(self, locator: impl Into<String>, action: Action) -> Self {
        self.state.lock().navigations.insert((locator.into(), action));
        self
    }

    pub fn removes_on(self, locator: impl Into<String>, action: Action) -> Self {
        self.state.lock().removals.insert((locator.into(), action));
        self
    }

    pub fn fail_open(self, reason: impl Into<String>) -> Self {
        self.state.lock().open_failure = Some(reason.into());
        self
    }

    /// Make a locator appear, e.g. a popup showing up mid-flow.
    pub fn show(&self, locator: impl Into<String>) {
        self.state.lock().present.insert(locator.into());
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Performed `(action, locator)` pairs in call order.
    pub fn performed(&self) -> Vec<(Action, String)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Perform {
                    action, locator, ..
                } => Some((*action, locator.clone())),
                DriverCall::Open(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActionDriver for ScriptedDriver {
    async fn open(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Open(url.to_string()));
        match &state.open_failure {
            Some(reason) => Err(DriverError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn perform(
        &self,
        action: Action,
        locator: &str,
        input: &str,
    ) -> Result<ActionOutcome, DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Perform {
            action,
            locator: locator.to_string(),
            input: input.to_string(),
        });

        if let Some(reason) = state.take_failure(action, locator) {
            debug!(%action, locator, %reason, "scripted action failure");
            return Err(DriverError::ActionFailed {
                action,
                locator: locator.to_string(),
                reason,
            });
        }
        if !state.present.contains(locator) {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }

        let key = (locator.to_string(), action);
        let outcome = ActionOutcome {
            text: state.texts.get(locator).cloned(),
            navigated: state.navigations.contains(&key),
        };
        if state.removals.contains(&key) {
            state.present.remove(locator);
        }
        Ok(outcome)
    }

    async fn element_present(&self, locator: &str) -> bool {
        self.state.lock().present.contains(locator)
    }
}
