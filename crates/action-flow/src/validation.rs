//! Multi-field validation of authored flow documents.
//!
//! Every violated field is reported, not only the first one, so an author can
//! fix a document in a single round trip.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    Action, FlowDocument, Interruption, NextStep, RetryConfig, RetryStrategy, Step, TriggerOn,
};

/// A single violated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field, e.g. `steps[1].actions[0]`
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every issue found in one document
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("validation failed: {}", summarize(.issues))]
pub struct ValidationError {
    issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue::new(field, message)])
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    /// Re-root every field path under `prefix`.
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            issues: self
                .issues
                .into_iter()
                .map(|issue| ValidationIssue {
                    field: format!("{prefix}.{}", issue.field),
                    message: issue.message,
                })
                .collect(),
        }
    }
}

#[derive(Default)]
struct Collector {
    issues: Vec<ValidationIssue>,
}

impl Collector {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(field, message));
    }

    fn actions(&mut self, field: &str, raw: &[String]) -> Vec<Action> {
        let mut parsed = Vec::with_capacity(raw.len());
        for (position, name) in raw.iter().enumerate() {
            match name.parse::<Action>() {
                Ok(action) => parsed.push(action),
                Err(unknown) => self.push(
                    format!("{field}[{position}]"),
                    format!("unknown action '{unknown}'"),
                ),
            }
        }
        parsed
    }
}

pub(crate) fn validate_document(
    document: &FlowDocument,
) -> Result<(Vec<Step>, Vec<Interruption>), ValidationError> {
    let mut collector = Collector::default();

    if document.steps.is_empty() {
        collector.push("steps", "a flow needs at least one step");
    }

    let mut seen = HashSet::new();
    let mut start_steps = Vec::new();
    let mut steps = Vec::with_capacity(document.steps.len());
    for (position, raw) in document.steps.iter().enumerate() {
        let field = format!("steps[{position}]");
        if raw.xpath.trim().is_empty() {
            collector.push(format!("{field}.xpath"), "locator must not be empty");
        } else if !seen.insert(raw.xpath.as_str()) {
            collector.push(
                format!("{field}.xpath"),
                format!("duplicate locator '{}'", raw.xpath),
            );
        }
        if raw.start_trigger {
            start_steps.push(position);
        }

        let actions = collector.actions(&format!("{field}.actions"), &raw.actions);
        let next = match &raw.next {
            Some(next) if !next.xpath.trim().is_empty() => Some(NextStep {
                xpath: next.xpath.clone(),
                actions: collector.actions(&format!("{field}.next.actions"), &next.actions),
            }),
            Some(next) if !next.actions.is_empty() => {
                collector.push(
                    format!("{field}.next.xpath"),
                    "transition actions require a next locator",
                );
                None
            }
            _ => None,
        };

        steps.push(Step {
            xpath: raw.xpath.clone(),
            actions,
            next,
            start_trigger: raw.start_trigger,
        });
    }

    if start_steps.len() > 1 {
        let positions = start_steps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        collector.push(
            "steps",
            format!("at most one step may set start_trigger (found at {positions})"),
        );
    }

    let mut interruptions = Vec::with_capacity(document.interruptions.len());
    for (position, raw) in document.interruptions.iter().enumerate() {
        let field = format!("interruptions[{position}]");
        let actions = collector.actions(&format!("{field}.actions"), &raw.actions);

        let trigger = match raw.trigger.on.parse::<TriggerOn>() {
            Ok(trigger) => Some(trigger),
            Err(unknown) => {
                collector.push(
                    format!("{field}.trigger.on"),
                    format!(
                        "trigger must be one of on_error, on_load, on_element_found (got '{unknown}')"
                    ),
                );
                None
            }
        };
        if trigger == Some(TriggerOn::OnElementFound) && raw.xpath.trim().is_empty() {
            collector.push(
                format!("{field}.xpath"),
                "on_element_found interruptions need a locator to watch",
            );
        }

        if raw.retry.attempts < 1 {
            collector.push(
                format!("{field}.retry.attempts"),
                format!("attempts must be at least 1 (got {})", raw.retry.attempts),
            );
        }
        if raw.retry.delay_ms < 0 {
            collector.push(
                format!("{field}.retry.delay_ms"),
                format!("delay_ms must not be negative (got {})", raw.retry.delay_ms),
            );
        }
        let strategy = match raw.retry.strategy.parse::<RetryStrategy>() {
            Ok(strategy) => strategy,
            Err(unknown) => {
                collector.push(
                    format!("{field}.retry.strategy"),
                    format!("strategy must be linear or exponential (got '{unknown}')"),
                );
                RetryStrategy::default()
            }
        };

        if let Some(trigger) = trigger {
            interruptions.push(Interruption {
                name: raw.name.clone(),
                xpath: raw.xpath.clone(),
                actions,
                trigger,
                retry: RetryConfig {
                    attempts: u32::try_from(raw.retry.attempts.max(1)).unwrap_or(u32::MAX),
                    delay_ms: raw.retry.delay_ms.max(0) as u64,
                    strategy,
                },
            });
        }
    }

    if collector.issues.is_empty() {
        Ok((steps, interruptions))
    } else {
        Err(ValidationError::new(collector.issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Flow, InterruptionDocument, NextDocument, RetryDocument, StepDocument, TriggerDocument,
    };

    fn step(xpath: &str, actions: &[&str]) -> StepDocument {
        StepDocument {
            xpath: xpath.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            next: None,
            start_trigger: false,
        }
    }

    fn fields(err: &ValidationError) -> Vec<&str> {
        err.issues().iter().map(|i| i.field.as_str()).collect()
    }

    #[test]
    fn reports_every_violated_field() {
        let document = FlowDocument {
            name: "broken".to_string(),
            steps: vec![
                step("//a", &["strong_click", "hover"]),
                StepDocument {
                    next: Some(NextDocument {
                        xpath: "//c".to_string(),
                        actions: vec!["wiggle".to_string()],
                    }),
                    ..step("//b", &[])
                },
            ],
            interruptions: vec![InterruptionDocument {
                name: "popup".to_string(),
                xpath: "//modal".to_string(),
                actions: vec!["strong_click".to_string()],
                trigger: TriggerDocument {
                    on: "on_hover".to_string(),
                },
                retry: RetryDocument {
                    attempts: 0,
                    delay_ms: -5,
                    strategy: "fibonacci".to_string(),
                },
            }],
            ..FlowDocument::default()
        };

        let err = Flow::from_document(document).unwrap_err();
        assert_eq!(
            fields(&err),
            vec![
                "steps[0].actions[1]",
                "steps[1].next.actions[0]",
                "interruptions[0].trigger.on",
                "interruptions[0].retry.attempts",
                "interruptions[0].retry.delay_ms",
                "interruptions[0].retry.strategy",
            ]
        );
    }

    #[test]
    fn rejects_multiple_start_triggers_and_duplicates() {
        let mut first = step("//a", &[]);
        first.start_trigger = true;
        let mut second = step("//a", &[]);
        second.start_trigger = true;
        let document = FlowDocument {
            steps: vec![first, second],
            ..FlowDocument::default()
        };

        let err = Flow::from_document(document).unwrap_err();
        assert_eq!(fields(&err), vec!["steps[1].xpath", "steps"]);
        assert!(err.to_string().contains("start_trigger"));
    }

    #[test]
    fn rejects_empty_flow() {
        let err = Flow::from_document(FlowDocument::default()).unwrap_err();
        assert_eq!(fields(&err), vec!["steps"]);
    }

    #[test]
    fn blank_next_is_terminal_but_orphan_actions_are_not() {
        let mut terminal = step("//a", &[]);
        terminal.next = Some(NextDocument::default());
        let flow = Flow::from_document(FlowDocument {
            steps: vec![terminal],
            ..FlowDocument::default()
        })
        .unwrap();
        assert!(flow.steps()[0].next.is_none());

        let mut orphan = step("//a", &[]);
        orphan.next = Some(NextDocument {
            xpath: " ".to_string(),
            actions: vec!["strong_click".to_string()],
        });
        let err = Flow::from_document(FlowDocument {
            steps: vec![orphan],
            ..FlowDocument::default()
        })
        .unwrap_err();
        assert_eq!(fields(&err), vec!["steps[0].next.xpath"]);
    }

    #[test]
    fn prefixed_reroots_fields() {
        let err = ValidationError::single("steps", "empty").prefixed("flows[2]");
        assert_eq!(err.issues()[0].field, "flows[2].steps");
    }

    #[test]
    fn entry_point_prefers_start_trigger() {
        let mut second = step("//b", &[]);
        second.start_trigger = true;
        let flow = Flow::from_document(FlowDocument {
            steps: vec![step("//a", &[]), second],
            ..FlowDocument::default()
        })
        .unwrap();
        assert_eq!(flow.entry_index(), 1);
        assert_eq!(flow.step_index("//a"), Some(0));
        assert!(flow.step("//missing").is_none());
    }
}
