//! `IsRequestAllowed` as a service, in-process or over HTTP

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use tracing::error;

use crate::error::{AuthError, Result};
use crate::pipeline::AuthContext;
use crate::types::{IsRequestAllowedRequest, IsRequestAllowedResponse};

/// Route of the remote variant.
pub const IS_REQUEST_ALLOWED_PATH: &str = "/v3/auth/isrequestallowed";

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn is_request_allowed(&self, req: &IsRequestAllowedRequest) -> Result<IsRequestAllowedResponse>;
}

#[async_trait]
impl AuthService for AuthContext {
    async fn is_request_allowed(&self, req: &IsRequestAllowedRequest) -> Result<IsRequestAllowedResponse> {
        AuthContext::is_request_allowed(self, req).await
    }
}

/// Router exposing `POST /v3/auth/isrequestallowed`.
pub fn routes(service: Arc<dyn AuthService>) -> Router {
    Router::new()
        .route(IS_REQUEST_ALLOWED_PATH, post(is_request_allowed))
        .with_state(service)
}

async fn is_request_allowed(
    State(service): State<Arc<dyn AuthService>>,
    Json(req): Json<IsRequestAllowedRequest>,
) -> Result<Json<IsRequestAllowedResponse>> {
    match service.is_request_allowed(&req).await {
        Ok(res) => Ok(Json(res)),
        Err(e) => {
            error!(url = %req.url, method = %req.method, error = %e, "failed to evaluate request");
            Err(e)
        }
    }
}

/// Client of a remote [`routes`] deployment.
#[derive(Debug, Clone)]
pub struct RemoteAuthService {
    endpoint: String,
    http_client: reqwest::Client,
}

impl RemoteAuthService {
    /// `base_url` is the server root, e.g. `http://auth:8080`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            endpoint: format!("{}{IS_REQUEST_ALLOWED_PATH}", base_url.trim_end_matches('/')),
            http_client,
        }
    }
}

#[async_trait]
impl AuthService for RemoteAuthService {
    #[tracing::instrument(skip_all, name = "RemoteAuthService::is_request_allowed")]
    async fn is_request_allowed(&self, req: &IsRequestAllowedRequest) -> Result<IsRequestAllowedResponse> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| AuthError::upstream("auth service", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::upstream("auth service", format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::upstream("auth service", format!("failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthOptions;
    use crate::provider::{MemoryApiKeyStore, StaticGroups, StaticIdentityProvider};
    use crate::types::RequestStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use kubefleet_authz::EnforcementTuple;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Deny;

    #[async_trait]
    impl crate::provider::Authorizer for Deny {
        async fn enforce(&self, _tuple: &EnforcementTuple) -> Result<bool> {
            Ok(false)
        }
    }

    fn local() -> Arc<dyn AuthService> {
        Arc::new(AuthContext::new(
            Arc::new(StaticIdentityProvider::new()),
            Arc::new(StaticGroups::new()),
            Arc::new(MemoryApiKeyStore::new()),
            Arc::new(Deny),
            AuthOptions::new(),
        ))
    }

    #[tokio::test]
    async fn route_answers_with_response_json() {
        let app = routes(local());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(IS_REQUEST_ALLOWED_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"url": "/v3/projects", "method": "GET"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let res: IsRequestAllowedResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(res.status, RequestStatus::RequestNotAuthenticated);
    }

    #[tokio::test]
    async fn remote_client_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IS_REQUEST_ALLOWED_PATH))
            .and(body_partial_json(json!({"url": "/v3/clusters", "sessionToken": "tok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "RequestAllowed",
                "sessionData": {"username": "alice@example.com", "groups": ["sre"]}
            })))
            .mount(&server)
            .await;

        let client = RemoteAuthService::new(&format!("{}/", server.uri()));
        let req = IsRequestAllowedRequest::new("/v3/clusters", "GET").with_session_token("tok");
        let res = client.is_request_allowed(&req).await.unwrap();
        assert!(res.is_allowed());
        assert_eq!(res.session_data.username, "alice@example.com");
        assert_eq!(res.session_data.groups, vec!["sre"]);
    }

    #[tokio::test]
    async fn remote_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IS_REQUEST_ALLOWED_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom", "status": 500})))
            .mount(&server)
            .await;

        let client = RemoteAuthService::new(&server.uri());
        let err = client
            .is_request_allowed(&IsRequestAllowedRequest::new("/v3/clusters", "GET"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Upstream { collaborator: "auth service", .. }));
    }
}
