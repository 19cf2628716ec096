//! HTTP error mapping
//!
//! Domain errors become JSON bodies of the form
//! `{"success": false, "error": "...", "issues": [...]}`; `issues` is only
//! present for validation failures.

use action_flow::{ValidationError, ValidationIssue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use skuflow_scheduler::SchedulerError;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    issues: Vec<ValidationIssue>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<&'a [ValidationIssue]>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
            issues: err.into_issues(),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Validation(validation) => validation.into(),
            SchedulerError::JobNotFound(_) | SchedulerError::FlowNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            SchedulerError::FlowInUse(_)
            | SchedulerError::DuplicateFlow(_)
            | SchedulerError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
            SchedulerError::ShuttingDown => {
                warn!("submission refused during shutdown");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: &self.message,
            issues: (!self.issues.is_empty()).then_some(self.issues.as_slice()),
        };
        (self.status, Json(body)).into_response()
    }
}
