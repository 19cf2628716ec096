use std::net::SocketAddr;
use std::sync::Arc;

use action_flow::{Action, ScriptedDriver};
use serde_json::json;
use skuflow_cli::{build_router, ApiClient, AppConfig, AppState, ClientError, HttpStatusSource};
use skuflow_core_types::{JobId, PlanTier, RequestContext};
use skuflow_scheduler::{
    ExecutionRequest, JobPoller, PollConfig, PollError, PollOutcome, StatusError, StatusSource,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_server(driver: ScriptedDriver) -> SocketAddr {
    let router = build_router(AppState::from_config(&AppConfig::default(), Arc::new(driver)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .unwrap();
    });
    addr
}

fn quick_polls() -> PollConfig {
    PollConfig {
        interval_ms: 10,
        max_polls: 300,
        transient_interval_ms: 5,
        max_transient_errors: 2,
    }
}

fn request(xpath: &str) -> ExecutionRequest {
    serde_json::from_value(json!({
        "skus": ["A1"],
        "flows": [{
            "name": "prices",
            "url": "https://shop.example",
            "steps": [{ "xpath": xpath, "actions": ["enter_string", "print_text"] }]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn submit_and_wait_over_http() {
    let driver = ScriptedDriver::new().with_text("//price", "19.99");
    let addr = spawn_server(driver).await;
    let client = ApiClient::new(
        format!("http://{addr}/"),
        RequestContext::new("acme", PlanTier::Premium),
    )
    .unwrap();

    let job_id = client.submit(&request("//price")).await.unwrap();
    let poller = JobPoller::new(Arc::new(HttpStatusSource::new(client)), quick_polls());
    let PollOutcome::Completed { result: Some(result) } = poller.wait(&job_id).await.unwrap() else {
        panic!("job should complete");
    };
    assert_eq!(result["runs"][0]["extracted"][0], "19.99");
}

#[tokio::test]
async fn failed_job_reports_headline_error_over_http() {
    let driver = ScriptedDriver::new()
        .with_element("//price")
        .fail_always("//price", Action::EnterString);
    let addr = spawn_server(driver).await;
    let client = ApiClient::new(format!("http://{addr}"), RequestContext::anonymous()).unwrap();

    let job_id = client.submit(&request("//price")).await.unwrap();
    let poller = JobPoller::new(Arc::new(HttpStatusSource::new(client)), quick_polls());
    let PollOutcome::Failed { error } = poller.wait(&job_id).await.unwrap() else {
        panic!("job should fail");
    };
    assert!(error.contains("flow 'prices' failed for sku 'A1'"), "{error}");
}

#[tokio::test]
async fn rejected_submission_carries_the_issues() {
    let addr = spawn_server(ScriptedDriver::new()).await;
    let client = ApiClient::new(format!("http://{addr}"), RequestContext::anonymous()).unwrap();

    let err = client
        .submit(&ExecutionRequest::default())
        .await
        .unwrap_err();
    let ClientError::Status { status, body } = err else {
        panic!("expected a status error");
    };
    assert_eq!(status.as_u16(), 400);
    assert_eq!(body["issues"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_job_maps_to_not_found() {
    let addr = spawn_server(ScriptedDriver::new()).await;
    let client = ApiClient::new(format!("http://{addr}"), RequestContext::anonymous()).unwrap();
    let source = HttpStatusSource::new(client.clone());

    assert_eq!(
        source.fetch(&JobId::from("missing")).await.unwrap_err(),
        StatusError::NotFound(JobId::from("missing"))
    );
    let poller = JobPoller::new(Arc::new(source), quick_polls());
    assert!(matches!(
        poller.wait(&JobId::from("missing")).await,
        Err(PollError::NotFound(_))
    ));
}

#[tokio::test]
async fn unreachable_server_exhausts_the_transient_budget() {
    let addr = {
        let vacant = TcpListener::bind("127.0.0.1:0").await.unwrap();
        vacant.local_addr().unwrap()
    };
    let client = ApiClient::new(format!("http://{addr}"), RequestContext::anonymous()).unwrap();
    let poller = JobPoller::new(Arc::new(HttpStatusSource::new(client)), quick_polls());

    let err = poller.wait(&JobId::from("job-1")).await.unwrap_err();
    assert!(matches!(err, PollError::Transport { attempts: 3, .. }), "{err:?}");
}

#[tokio::test]
async fn malformed_base_url_is_not_retried() {
    let client = ApiClient::new("not a url", RequestContext::anonymous()).unwrap();
    let err = client.status(&JobId::from("job-1")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
    assert!(!err.is_transient());

    let poller = JobPoller::new(Arc::new(HttpStatusSource::new(client)), quick_polls());
    assert!(matches!(
        poller.wait(&JobId::from("job-1")).await,
        Err(PollError::Fatal(_))
    ));
}

#[tokio::test]
async fn truncated_error_body_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 64\r\n\r\n{\"error\"")
            .await
            .unwrap();
    });

    let client = ApiClient::new(format!("http://{addr}"), RequestContext::anonymous()).unwrap();
    let err = client.status(&JobId::from("job-1")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
}
