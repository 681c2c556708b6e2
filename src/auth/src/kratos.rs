//! Ory Kratos identity provider
//!
//! Sessions are validated with `GET {base}/sessions/whoami`, forwarding the
//! session token and cookie. Kratos answers 401 when the credentials are
//! missing or invalid.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::AuthConfig;
use crate::credentials::X_SESSION_TOKEN;
use crate::error::{AuthError, Result};
use crate::provider::{Identity, IdentityProvider, SessionLookup};

const COLLABORATOR: &str = "identity provider";

#[derive(Debug, Deserialize)]
struct WhoAmI {
    #[serde(default)]
    active: bool,
    identity: Option<KratosIdentity>,
}

#[derive(Debug, Deserialize)]
struct KratosIdentity {
    id: String,
    #[serde(default)]
    traits: Map<String, Value>,
    #[serde(default)]
    metadata_public: Option<Map<String, Value>>,
}

impl KratosIdentity {
    fn into_identity(self) -> Identity {
        let public = |key: &str| {
            self.metadata_public
                .as_ref()
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };
        Identity {
            organization: public("Organization"),
            partner: public("Partner"),
            email: self
                .traits
                .get("email")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: self.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KratosIdentityProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl KratosIdentityProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.kratos_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IdentityProvider for KratosIdentityProvider {
    #[tracing::instrument(skip_all, name = "KratosIdentityProvider::validate_session")]
    async fn validate_session(&self, token: &str, cookie: &str) -> Result<SessionLookup> {
        let mut request = self.http_client.get(format!("{}/sessions/whoami", self.base_url));
        if !token.is_empty() {
            request = request.header(X_SESSION_TOKEN, token);
        }
        if !cookie.is_empty() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::upstream(COLLABORATOR, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                debug!("kratos rejected credentials");
                return Ok(SessionLookup::Unauthenticated);
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::upstream(COLLABORATOR, format!("{status}: {body}")));
            }
            _ => {}
        }

        let whoami: WhoAmI = response
            .json()
            .await
            .map_err(|e| AuthError::upstream(COLLABORATOR, format!("failed to parse session: {e}")))?;

        match (whoami.active, whoami.identity) {
            (true, Some(identity)) => Ok(SessionLookup::Active(identity.into_identity())),
            _ => Ok(SessionLookup::Inactive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn active_session_yields_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/whoami"))
            .and(header("x-session-token", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sess-1",
                "active": true,
                "identity": {
                    "id": "0b7a3d6e-1c1f-4f5e-9a1a-7f4c2d9b8e11",
                    "traits": {"email": "alice@example.com"},
                    "metadata_public": {"Organization": "acme", "Partner": "fleet"}
                }
            })))
            .mount(&server)
            .await;

        let provider = KratosIdentityProvider::new(server.uri());
        let lookup = provider.validate_session("tok-1", "").await.unwrap();
        assert_eq!(
            lookup,
            SessionLookup::Active(Identity {
                id: "0b7a3d6e-1c1f-4f5e-9a1a-7f4c2d9b8e11".into(),
                email: "alice@example.com".into(),
                organization: Some("acme".into()),
                partner: Some("fleet".into()),
            })
        );
    }

    #[tokio::test]
    async fn cookie_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/whoami"))
            .and(header("cookie", "ory_kratos_session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "active": true,
                "identity": {"id": "id-2", "traits": {"email": "bob@example.com"}}
            })))
            .mount(&server)
            .await;

        let provider = KratosIdentityProvider::new(format!("{}/", server.uri()));
        let lookup = provider
            .validate_session("", "ory_kratos_session=abc")
            .await
            .unwrap();
        assert!(matches!(lookup, SessionLookup::Active(identity) if identity.organization.is_none()));
    }

    #[tokio::test]
    async fn unauthorized_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/whoami"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = KratosIdentityProvider::new(server.uri());
        assert_eq!(
            provider.validate_session("bad", "").await.unwrap(),
            SessionLookup::Unauthenticated
        );
    }

    #[tokio::test]
    async fn inactive_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/whoami"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "active": false,
                "identity": {"id": "id-3", "traits": {}}
            })))
            .mount(&server)
            .await;

        let provider = KratosIdentityProvider::new(server.uri());
        assert_eq!(
            provider.validate_session("old", "").await.unwrap(),
            SessionLookup::Inactive
        );
    }

    #[tokio::test]
    async fn server_errors_are_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/whoami"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let provider = KratosIdentityProvider::new(server.uri());
        let err = provider.validate_session("tok", "").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Upstream { collaborator: "identity provider", ref message } if message.contains("maintenance")
        ));
    }
}
