//! HTTP client for a running skuflow server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use skuflow_core_types::{JobId, RequestContext};
use skuflow_scheduler::{
    ExecutionRequest, JobStatusView, StatusError, StatusSource, SubmitResponse,
};
use thiserror::Error;
use tracing::debug;

use crate::server::{PLAN_HEADER, TENANT_HEADER};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: Value },
    #[error("not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// Worth retrying: the server was unreachable or answered with a 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(err) => err.is_connect() || err.is_timeout(),
            ClientError::Status { status, .. } => status.is_server_error(),
            ClientError::NotFound(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    context: RequestContext,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, context: RequestContext) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            context,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn submit(&self, request: &ExecutionRequest) -> Result<JobId, ClientError> {
        let response = self
            .http
            .post(format!("{}/scrape", self.base_url))
            .header(TENANT_HEADER, &self.context.tenant)
            .header(PLAN_HEADER, self.context.plan.as_str())
            .json(request)
            .send()
            .await?;
        let accepted: SubmitResponse = decode(response, "job").await?;
        debug!(job = %accepted.job_id, "job submitted");
        Ok(accepted.job_id)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobStatusView, ClientError> {
        let response = self
            .http
            .get(format!("{}/job-result/{}", self.base_url, job_id))
            .send()
            .await?;
        decode(response, job_id.as_str()).await
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    subject: &str,
) -> Result<T, ClientError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(subject.to_string()));
    }
    if !status.is_success() {
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        return Err(ClientError::Status { status, body });
    }
    Ok(response.json().await?)
}

/// Job status read from a remote server.
pub struct HttpStatusSource {
    client: ApiClient,
}

impl HttpStatusSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, job_id: &JobId) -> Result<JobStatusView, StatusError> {
        self.client.status(job_id).await.map_err(|err| match err {
            ClientError::NotFound(_) => StatusError::NotFound(job_id.clone()),
            err if err.is_transient() => StatusError::Transient(err.to_string()),
            err => StatusError::Fatal(err.to_string()),
        })
    }
}
