//! HTTP types for the ModelGate server
//!
//! This module contains:
//! - Error response mapping (HttpError)
//! - Request/Response wire structures for the v2-style inference API
//! - Status document for request management endpoints

use axum::{
    http::{header::HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ModelGateError};
use crate::registry::Tensor;
use crate::scheduler::{InferenceRequest, RequestState};

/// Suggested retry delay for capacity-related errors (in seconds)
pub const RETRY_AFTER_SECONDS: u32 = 60;

/// HTTP error response with a status code derived from the error category
#[derive(Debug)]
pub struct HttpError {
    /// The underlying error
    pub error: ModelGateError,
    /// Suggested retry-after delay for recoverable errors
    pub retry_after: Option<u32>,
}

impl HttpError {
    pub fn new(error: ModelGateError) -> Self {
        let retry_after = match error.category() {
            ErrorCategory::Recoverable | ErrorCategory::Backend => Some(RETRY_AFTER_SECONDS),
            _ => None,
        };

        Self { error, retry_after }
    }

    fn status_code(&self) -> StatusCode {
        match self.error.category() {
            ErrorCategory::User => StatusCode::BAD_REQUEST,                // 400
            ErrorCategory::Model => StatusCode::BAD_REQUEST,               // 400
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,              // 404
            ErrorCategory::Recoverable => StatusCode::SERVICE_UNAVAILABLE, // 503
            ErrorCategory::Backend => StatusCode::SERVICE_UNAVAILABLE,     // 503
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,  // 500
        }
    }
}

impl From<ModelGateError> for HttpError {
    fn from(error: ModelGateError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        use axum::http::header::RETRY_AFTER;

        let status = self.status_code();
        let category = self.error.category().to_string();
        let message = self.error.to_string();
        let recoverable = self.error.is_recoverable();

        let body = Json(serde_json::json!({
            "error": message,
            "category": category,
            "recoverable": recoverable,
            "status": "error"
        }));

        let mut headers = HeaderMap::new();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                headers.insert(RETRY_AFTER, value);
            }
        }

        (status, headers, body).into_response()
    }
}

/// Inference request body for `POST /v2/models/:model/infer`
#[derive(Debug, Serialize, Deserialize)]
pub struct InferRequestBody {
    /// Caller correlation id, echoed back in the response
    #[serde(default)]
    pub id: Option<String>,
    pub inputs: Vec<Tensor>,
    #[serde(default)]
    pub parameters: Option<InferParameters>,
}

/// Optional request parameters
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InferParameters {
    #[serde(default)]
    pub priority: Option<u32>,
    /// Completion deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Successful inference response
#[derive(Debug, Serialize, Deserialize)]
pub struct InferResponseBody {
    pub model_name: String,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub request_id: u32,
    pub outputs: Vec<Tensor>,
}

impl InferResponseBody {
    pub fn from_request(request: &InferenceRequest) -> Self {
        InferResponseBody {
            model_name: request.key.name.clone(),
            model_version: request.key.version.to_string(),
            id: request.correlation_id.clone(),
            request_id: request.request_id,
            outputs: request.outputs.clone(),
        }
    }
}

/// Request status document for `/status/:request_id` and `/cancel/:request_id`
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestStatusBody {
    pub request_id: u32,
    pub model_name: String,
    pub model_version: String,
    pub state: String,
    pub outputs: Vec<Tensor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestStatusBody {
    pub fn from_request(request: &InferenceRequest) -> Self {
        RequestStatusBody {
            request_id: request.request_id,
            model_name: request.key.name.clone(),
            model_version: request.key.version.to_string(),
            state: request.state.as_str().to_string(),
            outputs: request.outputs.clone(),
            error: request.error.clone(),
        }
    }
}

/// Map a finished request onto the synchronous inference response
///
/// Completed requests produce a response body; failed and cancelled ones
/// surface as categorized errors.
pub fn infer_outcome(request: InferenceRequest) -> Result<InferResponseBody, HttpError> {
    match request.state {
        RequestState::Completed => Ok(InferResponseBody::from_request(&request)),
        RequestState::Failed => Err(ModelGateError::BackendFailed(
            request
                .error
                .unwrap_or_else(|| "execution failed".to_string()),
        )
        .into()),
        RequestState::Cancelled => Err(ModelGateError::InvalidRequest(format!(
            "request {} was cancelled",
            request.request_id
        ))
        .into()),
        // wait() only returns finished requests
        _ => Err(ModelGateError::InternalError(format!(
            "request {} returned unfinished",
            request.request_id
        ))
        .into()),
    }
}

/// Result type for server operations
pub type ServerResult<T> = anyhow::Result<T>;
