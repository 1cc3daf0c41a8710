use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nutriagent_core::AgentError;
use serde_json::json;
use tracing::{error, warn};

/// Error surface of the HTTP gateway.
///
/// Every failure leaves the gateway as a JSON body
/// `{"error": <message>, "kind": <kind>}` with the status code mapped
/// here. The `kind` strings for agent failures are the stable ones from
/// [`AgentError::kind`], so clients can branch without parsing messages.
#[derive(Debug)]
pub enum ApiError {
    /// The request body failed to parse.
    BadRequest(String),
    /// The addressed resource does not exist.
    NotFound(String),
    /// A failure surfaced by the agent runtime.
    Agent(AgentError),
}

impl ApiError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Agent(err) => agent_status(err),
        }
    }

    /// Machine-readable kind string carried in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Agent(err) => err.kind(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(message) | Self::NotFound(message) => message.clone(),
            Self::Agent(err) => err.to_string(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self::Agent(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(kind = self.kind(), %message, "Request failed");
        } else {
            warn!(kind = self.kind(), %message, "Request rejected");
        }
        let body = Json(json!({ "error": message, "kind": self.kind() }));
        (status, body).into_response()
    }
}

fn agent_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::UnknownSession(_) => StatusCode::NOT_FOUND,
        AgentError::SessionBusy(_) | AgentError::DuplicateTool(_) => StatusCode::CONFLICT,
        AgentError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
