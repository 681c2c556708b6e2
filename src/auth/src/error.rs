use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised while authenticating or authorizing a request.
///
/// `InvalidApiKey` and `InvalidSignature` are authentication failures: the
/// pipeline reports them as a `RequestNotAuthenticated` response rather than
/// an error. Everything else is fatal for the request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid api key")]
    InvalidApiKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("{collaborator} failed: {message}")]
    Upstream {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} did not answer within {after:?}")]
    Timeout {
        collaborator: &'static str,
        after: Duration,
    },

    #[error("policy engine error: {0}")]
    Engine(#[from] kubefleet_authz::AuthzError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    pub(crate) fn upstream(collaborator: &'static str, message: impl ToString) -> Self {
        Self::Upstream {
            collaborator,
            message: message.to_string(),
        }
    }

    /// Authentication failures, reported to callers as "not authenticated".
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::InvalidApiKey | Self::InvalidSignature)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::upstream("http", err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidApiKey | AuthError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Upstream { .. } | AuthError::Timeout { .. } | AuthError::Engine(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
