//! Wire types of the `IsRequestAllowed` contract
//!
//! The same JSON shapes are used by the in-process middleware and by the
//! remote route, so a caller can switch between the two without changes.

use serde::{Deserialize, Serialize};

/// Transport metadata about the calling client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    pub ip: String,
    pub host: String,
    pub user_agent: String,
}

/// One inbound call, as seen by the auth pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IsRequestAllowedRequest {
    /// URL (or URL template) being accessed; becomes the enforcement object.
    pub url: String,
    /// HTTP method; becomes the enforcement action.
    pub method: String,
    /// Fully-qualified method name, matched against the exclusion lists.
    pub full_method: String,
    pub session_token: String,
    pub cookie: String,
    /// API key id.
    pub api_key: String,
    /// Signature presented with the API key.
    pub api_token: String,
    pub org: String,
    pub project: String,
    /// Authenticate only.
    pub no_authz: bool,
    pub client: ClientInfo,
}

impl IsRequestAllowedRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn with_full_method(mut self, full_method: impl Into<String>) -> Self {
        self.full_method = full_method.into();
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = token.into();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn with_api_key(mut self, id: impl Into<String>, token: impl Into<String>) -> Self {
        self.api_key = id.into();
        self.api_token = token.into();
        self
    }

    pub fn with_scope(mut self, org: impl Into<String>, project: impl Into<String>) -> Self {
        self.org = org.into();
        self.project = project.into();
        self
    }

    pub fn without_authz(mut self) -> Self {
        self.no_authz = true;
        self
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    Unknown,
    RequestAllowed,
    RequestMethodOrUrlNotAllowed,
    RequestNotAuthenticated,
}

/// The authenticated principal, attached to allowed requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionData {
    pub username: String,
    pub account: String,
    pub organization: String,
    pub partner: String,
    pub groups: Vec<String>,
    pub client: ClientInfo,
}

impl SessionData {
    /// Subject used for enforcement.
    pub fn subject(&self) -> String {
        format!("u:{}", self.username)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IsRequestAllowedResponse {
    pub status: RequestStatus,
    pub reason: String,
    pub session_data: SessionData,
}

impl IsRequestAllowedResponse {
    pub fn allowed(session_data: SessionData) -> Self {
        Self {
            status: RequestStatus::RequestAllowed,
            reason: String::new(),
            session_data,
        }
    }

    pub fn not_authenticated(reason: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::RequestNotAuthenticated,
            reason: reason.into(),
            session_data: SessionData::default(),
        }
    }

    pub fn not_allowed(reason: impl Into<String>, session_data: SessionData) -> Self {
        Self {
            status: RequestStatus::RequestMethodOrUrlNotAllowed,
            reason: reason.into(),
            session_data,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status == RequestStatus::RequestAllowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default() {
        let req: IsRequestAllowedRequest =
            serde_json::from_value(json!({"url": "/v3/projects", "method": "GET"})).unwrap();
        assert_eq!(req, IsRequestAllowedRequest::new("/v3/projects", "GET"));
        assert!(!req.no_authz);
    }

    #[test]
    fn response_shape() {
        let res = IsRequestAllowedResponse::not_authenticated("no active session");
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            json!({
                "status": "RequestNotAuthenticated",
                "reason": "no active session",
                "sessionData": {
                    "username": "", "account": "", "organization": "", "partner": "",
                    "groups": [],
                    "client": {"ip": "", "host": "", "userAgent": ""}
                }
            })
        );
    }

    #[test]
    fn subject_is_user_prefixed() {
        let session = SessionData {
            username: "alice@example.com".into(),
            ..SessionData::default()
        };
        assert_eq!(session.subject(), "u:alice@example.com");
    }
}
