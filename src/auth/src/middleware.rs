//! axum middleware running the auth pipeline in front of handlers
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v3/projects", get(list_projects))
//!     .layer(axum::middleware::from_fn_with_state(auth_state, require_auth));
//! ```
//!
//! Allowed requests carry the caller's [`SessionData`] in their extensions.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::AuthOptions;
use crate::credentials::request_from_headers;
use crate::service::AuthService;
use crate::types::{RequestStatus, SessionData};

#[derive(Clone)]
pub struct AuthState {
    service: Arc<dyn AuthService>,
    options: Arc<AuthOptions>,
}

impl AuthState {
    /// `options` supplies the URL exclusions checked before the service is called.
    pub fn new(service: Arc<dyn AuthService>, options: AuthOptions) -> Self {
        Self {
            service,
            options: Arc::new(options),
        }
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    let body = Json(json!({
        "error": message,
        "status": status.as_u16(),
    }));
    (status, body).into_response()
}

/// Authenticate and authorize the request, or reject it with 401, 403 or 500.
///
/// The request path is both the enforcement object and the method name
/// matched against the exclusion lists.
pub async fn require_auth(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if state.options.url_excluded(&path) {
        debug!(path = %path, "url excluded from auth");
        return next.run(request).await;
    }

    let auth_req =
        request_from_headers(request.headers(), &path, request.method().as_str()).with_full_method(path.clone());

    let res = match state.service.is_request_allowed(&auth_req).await {
        Ok(res) => res,
        Err(e) => {
            error!(path = %path, error = %e, "failed to authenticate a request");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    match res.status {
        RequestStatus::RequestAllowed => {
            request.extensions_mut().insert::<SessionData>(res.session_data);
            next.run(request).await
        }
        RequestStatus::RequestMethodOrUrlNotAllowed => reject(StatusCode::FORBIDDEN, &res.reason),
        RequestStatus::RequestNotAuthenticated => reject(StatusCode::UNAUTHORIZED, &res.reason),
        RequestStatus::Unknown => {
            error!(path = %path, "auth service returned an unknown status");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}
