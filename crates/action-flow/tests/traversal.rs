use std::sync::Arc;

use action_flow::{
    Action, DefaultFlowExecutor, Flow, FlowError, FlowExecutor, ImmediateBackoff, NoopDriver,
    ScriptedDriver,
};
use serde_json::json;
use tokio::time::{timeout, Duration};

fn chain(len: usize) -> Flow {
    let steps: Vec<_> = (0..len)
        .map(|i| {
            let next = if i + 1 < len {
                json!({ "xpath": format!("//step-{}", i + 1), "actions": [] })
            } else {
                json!({ "xpath": "", "actions": [] })
            };
            json!({ "xpath": format!("//step-{i}"), "actions": ["strong_click"], "next": next })
        })
        .collect();
    serde_json::from_value(json!({ "name": "chain", "steps": steps })).unwrap()
}

fn scripted(driver: ScriptedDriver) -> DefaultFlowExecutor {
    DefaultFlowExecutor::new(Arc::new(driver)).with_backoff(Arc::new(ImmediateBackoff))
}

#[tokio::test]
async fn simple_chain_advances_once_per_step() {
    for len in [1, 2, 5, 12] {
        let flow = chain(len);
        let result = DefaultFlowExecutor::new(Arc::new(NoopDriver))
            .execute(&flow, "SKU-1")
            .await;
        assert!(result.success, "chain of {len}");
        assert_eq!(result.advances as usize, len);
        assert_eq!(result.visited.len(), len);
        assert!(result.error.is_none());
    }
}

#[tokio::test]
async fn dangling_reference_fails_without_hanging() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "dangling",
        "steps": [
            { "xpath": "//a", "actions": [], "next": { "xpath": "//nowhere", "actions": [] } }
        ]
    }))
    .unwrap();

    let result = timeout(
        Duration::from_secs(5),
        DefaultFlowExecutor::new(Arc::new(NoopDriver)).execute(&flow, ""),
    )
    .await
    .expect("traversal must terminate");

    assert!(!result.success);
    match result.failure {
        Some(FlowError::DanglingReference { from, target }) => {
            assert_eq!(from, "//a");
            assert_eq!(target, "//nowhere");
        }
        other => panic!("expected dangling reference, got {other:?}"),
    }
}

#[tokio::test]
async fn next_cycle_is_detected() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "loop",
        "steps": [
            { "xpath": "//a", "actions": ["scroll_view"], "next": { "xpath": "//b", "actions": [] } },
            { "xpath": "//b", "actions": ["scroll_view"], "next": { "xpath": "//a", "actions": [] } }
        ]
    }))
    .unwrap();

    let result = timeout(
        Duration::from_secs(5),
        DefaultFlowExecutor::new(Arc::new(NoopDriver)).execute(&flow, ""),
    )
    .await
    .expect("traversal must terminate");

    assert_eq!(
        result.failure,
        Some(FlowError::CyclicFlow {
            locator: "//a".to_string()
        })
    );
    assert_eq!(result.visited, vec!["//a".to_string(), "//b".to_string()]);
}

#[tokio::test]
async fn self_loop_is_a_cycle() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "self",
        "steps": [{ "xpath": "//a", "actions": [], "next": { "xpath": "//a", "actions": [] } }]
    }))
    .unwrap();
    let result = DefaultFlowExecutor::new(Arc::new(NoopDriver))
        .execute(&flow, "")
        .await;
    assert_eq!(result.error_kind.as_deref(), Some("cyclic_flow"));
}

#[tokio::test]
async fn first_declared_on_error_interruption_wins_every_run() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "tie-break",
        "steps": [{ "xpath": "//buy", "actions": ["strong_click"] }],
        "interruptions": [
            { "name": "first", "xpath": "//first", "actions": ["strong_click"], "trigger": { "on": "on_error" } },
            { "name": "second", "xpath": "//second", "actions": ["strong_click"], "trigger": { "on": "on_error" } }
        ]
    }))
    .unwrap();

    for _ in 0..5 {
        let driver = ScriptedDriver::for_flow(&flow)
            .with_element("//first")
            .with_element("//second")
            .fail_times("//buy", Action::StrongClick, 1);
        let result = scripted(driver.clone()).execute(&flow, "").await;

        assert!(result.success);
        assert_eq!(result.interruptions.len(), 1);
        assert_eq!(result.interruptions[0].name, "first");
        assert!(!driver
            .performed()
            .contains(&(Action::StrongClick, "//second".to_string())));
    }
}

#[tokio::test]
async fn recovery_resumes_at_the_failed_action() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "resume",
        "steps": [{ "xpath": "//form", "actions": ["scroll_view", "strong_click", "print_text"] }],
        "interruptions": [
            { "name": "popup", "xpath": "//close", "actions": ["strong_click"], "trigger": { "on": "on_error" } }
        ]
    }))
    .unwrap();
    let driver = ScriptedDriver::for_flow(&flow)
        .with_text("//form", "done")
        .with_element("//close")
        .fail_times("//form", Action::StrongClick, 1);

    let result = scripted(driver.clone()).execute(&flow, "").await;

    assert!(result.success);
    assert_eq!(result.interruptions[0].cursor.action, 1);
    assert_eq!(
        driver.performed(),
        vec![
            (Action::ScrollView, "//form".to_string()),
            (Action::StrongClick, "//form".to_string()),
            (Action::StrongClick, "//close".to_string()),
            (Action::StrongClick, "//form".to_string()),
            (Action::PrintText, "//form".to_string()),
        ]
    );
    assert_eq!(result.extracted, vec!["done".to_string()]);
}

#[tokio::test]
async fn exhausted_interruption_fails_the_flow() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "exhausted",
        "steps": [{ "xpath": "//buy", "actions": ["strong_click"] }],
        "interruptions": [{
            "name": "captcha",
            "xpath": "//captcha",
            "actions": ["strong_click"],
            "trigger": { "on": "on_error" },
            "retry": { "attempts": 2, "delay_ms": 5, "strategy": "exponential" }
        }]
    }))
    .unwrap();
    let driver = ScriptedDriver::for_flow(&flow)
        .with_element("//captcha")
        .fail_always("//buy", Action::StrongClick)
        .fail_always("//captcha", Action::StrongClick);

    let result = scripted(driver).execute(&flow, "").await;

    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(FlowError::RetriesExhausted { attempts: 2, .. })
    ));
    assert_eq!(result.interruptions[0].executions, 3);
    assert!(!result.interruptions[0].recovered);
}

#[tokio::test]
async fn table_rows_collect_stack_and_current_text() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "table",
        "steps": [
            { "xpath": "//search", "actions": ["enter_string"], "next": { "xpath": "//title", "actions": [] } },
            { "xpath": "//title", "actions": ["add_next"], "next": { "xpath": "//price", "actions": [] } },
            { "xpath": "//price", "actions": ["add_to_table", "clear_stack"] }
        ]
    }))
    .unwrap();
    let driver = ScriptedDriver::for_flow(&flow)
        .with_text("//title", "Blue Widget")
        .with_text("//price", "$4.20");

    let result = scripted(driver).execute(&flow, "BW-42").await;

    assert!(result.success);
    assert_eq!(
        result.table,
        vec![vec!["Blue Widget".to_string(), "$4.20".to_string()]]
    );
}

#[tokio::test]
async fn navigation_mid_flow_raises_on_load() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "navigate",
        "steps": [
            { "xpath": "//search", "actions": ["enter_string", "strong_click"],
              "next": { "xpath": "//result", "actions": [] } },
            { "xpath": "//result", "actions": ["print_text"] }
        ],
        "interruptions": [
            { "name": "after-load", "xpath": "//cookie", "actions": ["strong_click"], "trigger": { "on": "on_load" } }
        ]
    }))
    .unwrap();
    let driver = ScriptedDriver::for_flow(&flow)
        .with_text("//result", "19.99")
        .with_element("//cookie")
        .navigates_on("//search", Action::StrongClick);

    let result = scripted(driver.clone()).execute(&flow, "A1").await;

    assert!(result.success);
    assert_eq!(result.interruptions.len(), 1);
    let record = &result.interruptions[0];
    assert_eq!(record.name, "after-load");
    assert_eq!(record.step, "//search");
    assert_eq!(record.cursor.step, 0);
    assert_eq!(record.cursor.action, 1);
    assert_eq!(
        driver.performed(),
        vec![
            (Action::EnterString, "//search".to_string()),
            (Action::StrongClick, "//search".to_string()),
            (Action::StrongClick, "//cookie".to_string()),
            (Action::PrintText, "//result".to_string()),
        ]
    );
    assert_eq!(result.extracted, vec!["19.99".to_string()]);
}

#[tokio::test]
async fn retried_handler_collects_once() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "retried-collection",
        "steps": [{ "xpath": "//price", "actions": ["strong_click", "add_to_table"] }],
        "interruptions": [{
            "name": "banner",
            "xpath": "//banner",
            "actions": ["add_next", "strong_click"],
            "trigger": { "on": "on_error" },
            "retry": { "attempts": 3, "delay_ms": 1, "strategy": "linear" }
        }]
    }))
    .unwrap();
    let driver = ScriptedDriver::for_flow(&flow)
        .with_text("//banner", "H")
        .fail_times("//price", Action::StrongClick, 1)
        .fail_times("//banner", Action::StrongClick, 2);

    let result = scripted(driver).execute(&flow, "").await;

    assert!(result.success);
    assert_eq!(result.interruptions[0].executions, 3);
    assert_eq!(result.table, vec![vec!["H".to_string()]]);
}
