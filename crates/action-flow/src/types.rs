//! Core types for flow orchestration

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skuflow_core_types::FlowId;

use crate::errors::FlowError;
use crate::validation::{self, ValidationError};

/// Fixed action vocabulary available to steps and interruptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ScrollView,
    StrongClick,
    EnterString,
    AddNext,
    AddToTable,
    PrintText,
    ClearStack,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::ScrollView,
        Action::StrongClick,
        Action::EnterString,
        Action::AddNext,
        Action::AddToTable,
        Action::PrintText,
        Action::ClearStack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ScrollView => "scroll_view",
            Action::StrongClick => "strong_click",
            Action::EnterString => "enter_string",
            Action::AddNext => "add_next",
            Action::AddToTable => "add_to_table",
            Action::PrintText => "print_text",
            Action::ClearStack => "clear_stack",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Condition that activates an interruption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOn {
    OnError,
    OnLoad,
    OnElementFound,
}

impl TriggerOn {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerOn::OnError => "on_error",
            TriggerOn::OnLoad => "on_load",
            TriggerOn::OnElementFound => "on_element_found",
        }
    }
}

impl fmt::Display for TriggerOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_error" => Ok(TriggerOn::OnError),
            "on_load" => Ok(TriggerOn::OnLoad),
            "on_element_found" => Ok(TriggerOn::OnElementFound),
            other => Err(other.to_string()),
        }
    }
}

/// Backoff shape between interruption retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    Linear,
    Exponential,
}

impl RetryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryStrategy::Linear => "linear",
            RetryStrategy::Exponential => "exponential",
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(RetryStrategy::Linear),
            "exponential" => Ok(RetryStrategy::Exponential),
            other => Err(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire documents, as authored. Vocabulary members are plain strings here so
// that validation can report every bad entry instead of failing on the first.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub steps: Vec<StepDocument>,
    #[serde(default)]
    pub interruptions: Vec<InterruptionDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDocument {
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub next: Option<NextDocument>,
    #[serde(default)]
    pub start_trigger: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextDocument {
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptionDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub trigger: TriggerDocument,
    #[serde(default)]
    pub retry: RetryDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerDocument {
    #[serde(default)]
    pub on: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDocument {
    #[serde(default = "default_attempts")]
    pub attempts: i64,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: i64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_attempts() -> i64 {
    3
}

fn default_delay_ms() -> i64 {
    1000
}

fn default_strategy() -> String {
    RetryStrategy::Linear.as_str().to_string()
}

impl Default for RetryDocument {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            strategy: default_strategy(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// Validated, indexed flow definition. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FlowDocument", into = "FlowDocument")]
pub struct Flow {
    id: FlowId,
    name: String,
    url: String,
    steps: Vec<Step>,
    interruptions: Vec<Interruption>,
    index: HashMap<String, usize>,
}

impl Flow {
    /// Validate an authored document and build the locator index.
    pub fn from_document(document: FlowDocument) -> Result<Self, ValidationError> {
        let (steps, interruptions) = validation::validate_document(&document)?;
        let index = steps
            .iter()
            .enumerate()
            .map(|(position, step)| (step.xpath.clone(), position))
            .collect();
        Ok(Self {
            id: FlowId(document.id),
            name: document.name,
            url: document.url,
            steps,
            interruptions,
            index,
        })
    }

    pub fn to_document(&self) -> FlowDocument {
        FlowDocument::from(self.clone())
    }

    pub fn id(&self) -> &FlowId {
        &self.id
    }

    /// Replace the identifier; used when the catalogue assigns one.
    pub fn with_id(mut self, id: FlowId) -> Self {
        self.id = id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn interruptions(&self) -> &[Interruption] {
        &self.interruptions
    }

    /// Position of the step owning `xpath`.
    pub fn step_index(&self, xpath: &str) -> Option<usize> {
        self.index.get(xpath).copied()
    }

    /// O(1) lookup of a step by locator.
    pub fn step(&self, xpath: &str) -> Option<&Step> {
        self.step_index(xpath).map(|position| &self.steps[position])
    }

    /// Traversal entry point: the step marked `start_trigger`, else the first.
    pub fn entry_index(&self) -> usize {
        self.steps
            .iter()
            .position(|step| step.start_trigger)
            .unwrap_or(0)
    }
}

impl TryFrom<FlowDocument> for Flow {
    type Error = ValidationError;

    fn try_from(document: FlowDocument) -> Result<Self, Self::Error> {
        Flow::from_document(document)
    }
}

impl From<Flow> for FlowDocument {
    fn from(flow: Flow) -> Self {
        let names = |actions: &[Action]| actions.iter().map(|a| a.as_str().to_string()).collect();
        FlowDocument {
            id: flow.id.0,
            name: flow.name,
            url: flow.url,
            steps: flow
                .steps
                .iter()
                .map(|step| StepDocument {
                    xpath: step.xpath.clone(),
                    actions: names(&step.actions),
                    next: step.next.as_ref().map(|next| NextDocument {
                        xpath: next.xpath.clone(),
                        actions: names(&next.actions),
                    }),
                    start_trigger: step.start_trigger,
                })
                .collect(),
            interruptions: flow
                .interruptions
                .iter()
                .map(|interruption| InterruptionDocument {
                    name: interruption.name.clone(),
                    xpath: interruption.xpath.clone(),
                    actions: names(&interruption.actions),
                    trigger: TriggerDocument {
                        on: interruption.trigger.as_str().to_string(),
                    },
                    retry: RetryDocument {
                        attempts: i64::from(interruption.retry.attempts),
                        delay_ms: interruption.retry.delay_ms as i64,
                        strategy: interruption.retry.strategy.as_str().to_string(),
                    },
                })
                .collect(),
        }
    }
}

/// One node of the main traversal path
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub xpath: String,
    pub actions: Vec<Action>,
    /// Weak successor reference, resolved at traversal time.
    pub next: Option<NextStep>,
    pub start_trigger: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextStep {
    pub xpath: String,
    /// Transition actions run against `xpath` before the successor executes.
    pub actions: Vec<Action>,
}

/// Out-of-band handler that may preempt the main traversal
#[derive(Debug, Clone, PartialEq)]
pub struct Interruption {
    pub name: String,
    pub xpath: String,
    pub actions: Vec<Action>,
    pub trigger: TriggerOn,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first execution (>= 1).
    pub attempts: u32,
    pub delay_ms: u64,
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 1000,
            strategy: RetryStrategy::Linear,
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal state and results
// ---------------------------------------------------------------------------

/// Which action list of a step the cursor points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPhase {
    Step,
    Transition,
}

/// Resumable position of the main traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalCursor {
    pub step: usize,
    pub phase: CursorPhase,
    pub action: usize,
}

impl TraversalCursor {
    pub fn at_step(step: usize) -> Self {
        Self {
            step,
            phase: CursorPhase::Step,
            action: 0,
        }
    }

    pub fn transition(step: usize) -> Self {
        Self {
            step,
            phase: CursorPhase::Transition,
            action: 0,
        }
    }
}

/// Mutable data collected while a flow runs against one target
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    /// Search string for `enter_string`
    pub input: String,
    /// Working stack fed by `add_next`
    pub stack: Vec<String>,
    /// Texts emitted by `print_text`
    pub extracted: Vec<String>,
    /// Rows appended by `add_to_table`
    pub table: Vec<Vec<String>>,
}

impl FlowContext {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

/// Record of one interruption activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionRecord {
    pub name: String,
    pub trigger: TriggerOn,
    /// Locator of the step that was suspended
    pub step: String,
    pub cursor: TraversalCursor,
    /// Executions of the handler, including the first
    pub executions: u32,
    pub recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Step execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub locator: String,
    pub success: bool,
    pub actions_run: u32,
    pub recoveries: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(locator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            locator: locator.into(),
            success: false,
            actions_run: 0,
            recoveries: 0,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            error: None,
        }
    }

    pub fn with_success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }
}

/// Flow execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow_id: FlowId,
    pub flow_name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// Completed steps, counted when the engine leaves `Advancing`
    pub advances: u32,
    pub visited: Vec<String>,
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interruptions: Vec<InterruptionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<FlowError>,
}

impl FlowResult {
    pub fn new(flow: &Flow) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow.id().clone(),
            flow_name: flow.name().to_string(),
            success: false,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            advances: 0,
            visited: Vec::new(),
            step_results: Vec::new(),
            interruptions: Vec::new(),
            extracted: Vec::new(),
            table: Vec::new(),
            error_kind: None,
            error: None,
            failure: None,
        }
    }

    pub fn with_success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn with_failure(mut self, error: FlowError) -> Self {
        self.success = false;
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(error.to_string());
        self.failure = Some(error);
        self
    }

    /// Move collected data out of the traversal context.
    pub fn with_collected(mut self, context: FlowContext) -> Self {
        self.extracted = context.extracted;
        self.table = context.table;
        self
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }

    /// Split into success value or the fatal cause.
    pub fn into_result(self) -> Result<FlowResult, FlowError> {
        match self.failure.clone() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_vocabulary_round_trips_through_strings() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert!("double_click".parse::<Action>().is_err());
    }

    #[test]
    fn retry_document_defaults_match_authoring_tool() {
        let doc: InterruptionDocument = serde_json::from_value(serde_json::json!({
            "name": "popup",
            "xpath": "//div[@id='modal']",
            "actions": ["strong_click"],
            "trigger": { "on": "on_element_found" }
        }))
        .unwrap();
        assert_eq!(doc.retry, RetryDocument::default());
        assert_eq!(doc.retry.attempts, 3);
        assert_eq!(doc.retry.delay_ms, 1000);
        assert_eq!(doc.retry.strategy, "linear");
    }

    #[test]
    fn flow_deserializes_through_validation() {
        let flow: Flow = serde_json::from_value(serde_json::json!({
            "_id": "f-1",
            "name": "search",
            "url": "https://shop.example",
            "steps": [
                { "xpath": "//input", "actions": ["enter_string"], "next": { "xpath": "//button", "actions": [] } },
                { "xpath": "//button", "actions": ["strong_click"], "start_trigger": false }
            ]
        }))
        .unwrap();
        assert_eq!(flow.id().as_str(), "f-1");
        assert_eq!(flow.step("//button").unwrap().actions, vec![Action::StrongClick]);

        let bad: Result<Flow, _> = serde_json::from_value(serde_json::json!({
            "name": "broken",
            "steps": [{ "xpath": "//a", "actions": ["teleport"] }]
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn document_round_trip_preserves_shape() {
        let doc = FlowDocument {
            id: "f-2".to_string(),
            name: "pricing".to_string(),
            url: "https://shop.example".to_string(),
            steps: vec![StepDocument {
                xpath: "//span[@class='price']".to_string(),
                actions: vec!["print_text".to_string()],
                next: None,
                start_trigger: true,
            }],
            interruptions: vec![],
        };
        let flow = Flow::from_document(doc.clone()).unwrap();
        assert_eq!(flow.to_document(), doc);
    }
}
