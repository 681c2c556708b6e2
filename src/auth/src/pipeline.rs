//! Request auth pipeline
//!
//! Each call runs through
//!
//! ```text
//! Start -> Authenticating -> Authenticated -> Authorizing -> Allowed | Denied
//!                         \-> Unauthenticated
//! ```
//!
//! with `Error` reachable from any non-terminal state. Exclusion lists are
//! checked before authentication. Authentication and authorization denials
//! are returned as responses; only collaborator or engine failures are errors.

use kubefleet_authz::EnforcementTuple;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AuthOptions;
use crate::credentials::{signature_matches, Credentials};
use crate::error::{AuthError, Result};
use crate::provider::{ApiKeyStore, Authorizer, GroupLookup, IdentityProvider, SessionLookup};
use crate::types::{IsRequestAllowedRequest, IsRequestAllowedResponse, SessionData};

pub const REASON_NO_CREDENTIALS: &str = "no or invalid credentials";
pub const REASON_NO_SESSION: &str = "no active session";
pub const REASON_NOT_AUTHORIZED: &str = "not authorized to perform action";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Authenticating,
    Authenticated,
    Authorizing,
    Allowed,
    Denied,
    Unauthenticated,
    Error,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Allowed | Self::Denied | Self::Unauthenticated | Self::Error
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal state of a run together with the response sent to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub state: PipelineState,
    pub response: IsRequestAllowedResponse,
}

enum Authentication {
    Authenticated(SessionData),
    Rejected(String),
}

/// Tracks the state of one run and logs every transition.
struct Run<'a> {
    state: PipelineState,
    full_method: &'a str,
}

impl<'a> Run<'a> {
    fn new(full_method: &'a str) -> Self {
        Self {
            state: PipelineState::Start,
            full_method,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(method = %self.full_method, from = %self.state, to = %next, "auth pipeline transition");
        self.state = next;
    }

    fn finish(mut self, next: PipelineState, response: IsRequestAllowedResponse) -> Decision {
        debug_assert!(next.is_terminal(), "pipeline finished in non-terminal state {next}");
        self.advance(next);
        Decision {
            state: self.state,
            response,
        }
    }
}

/// In-process implementation of `IsRequestAllowed`.
#[derive(Clone)]
pub struct AuthContext {
    identity: Arc<dyn IdentityProvider>,
    groups: Arc<dyn GroupLookup>,
    keys: Arc<dyn ApiKeyStore>,
    authorizer: Arc<dyn Authorizer>,
    options: AuthOptions,
}

impl AuthContext {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        groups: Arc<dyn GroupLookup>,
        keys: Arc<dyn ApiKeyStore>,
        authorizer: Arc<dyn Authorizer>,
        options: AuthOptions,
    ) -> Self {
        Self {
            identity,
            groups,
            keys,
            authorizer,
            options,
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub async fn is_request_allowed(&self, req: &IsRequestAllowedRequest) -> Result<IsRequestAllowedResponse> {
        self.evaluate(req).await.map(|decision| decision.response)
    }

    /// Run the pipeline and report the terminal state reached.
    pub async fn evaluate(&self, req: &IsRequestAllowedRequest) -> Result<Decision> {
        let mut run = Run::new(&req.full_method);

        if self.options.skips_auth(&req.full_method) {
            debug!(method = %req.full_method, "method excluded from auth");
            let session = SessionData {
                client: req.client.clone(),
                ..SessionData::default()
            };
            return Ok(run.finish(PipelineState::Allowed, IsRequestAllowedResponse::allowed(session)));
        }

        run.advance(PipelineState::Authenticating);
        let session = match self.authenticate(req).await {
            Ok(Authentication::Authenticated(session)) => session,
            Ok(Authentication::Rejected(reason)) => {
                info!(method = %req.full_method, url = %req.url, reason = %reason, "request not authenticated");
                return Ok(run.finish(
                    PipelineState::Unauthenticated,
                    IsRequestAllowedResponse::not_authenticated(reason),
                ));
            }
            Err(e) => {
                run.advance(PipelineState::Error);
                return Err(e);
            }
        };
        run.advance(PipelineState::Authenticated);

        if req.no_authz || self.options.skips_authz(&req.full_method) {
            return Ok(run.finish(PipelineState::Allowed, IsRequestAllowedResponse::allowed(session)));
        }

        run.advance(PipelineState::Authorizing);
        let tuple = EnforcementTuple::new(session.subject(), req.url.clone(), req.method.clone())
            .with_project(req.project.clone())
            .with_organization(req.org.clone());
        let allowed = match self.bounded("policy engine", self.authorizer.enforce(&tuple)).await {
            Ok(allowed) => allowed,
            Err(e) => {
                run.advance(PipelineState::Error);
                return Err(e);
            }
        };

        if allowed {
            Ok(run.finish(PipelineState::Allowed, IsRequestAllowedResponse::allowed(session)))
        } else {
            info!(
                user = %session.username,
                url = %req.url,
                method = %req.method,
                org = %tuple.organization,
                project = %tuple.project,
                "request denied"
            );
            Ok(run.finish(
                PipelineState::Denied,
                IsRequestAllowedResponse::not_allowed(REASON_NOT_AUTHORIZED, session),
            ))
        }
    }

    async fn authenticate(&self, req: &IsRequestAllowedRequest) -> Result<Authentication> {
        let mut session = match Credentials::from_request(req) {
            Credentials::ApiKey { id, signature } => match self.authenticate_api_key(id, signature).await {
                Ok(session) => session,
                Err(e) if e.is_authentication_failure() => {
                    return Ok(Authentication::Rejected(e.to_string()))
                }
                Err(e) => return Err(e),
            },
            Credentials::Session { token, cookie } => {
                match self.authenticate_session(token, cookie).await? {
                    Authentication::Authenticated(session) => session,
                    rejected => return Ok(rejected),
                }
            }
        };
        session.client = req.client.clone();
        Ok(Authentication::Authenticated(session))
    }

    async fn authenticate_api_key(&self, id: &str, signature: &str) -> Result<SessionData> {
        let key = self
            .bounded("api key store", self.keys.get_key_by_id(id))
            .await?
            .ok_or_else(|| {
                warn!(key = %id, "unknown api key");
                AuthError::InvalidApiKey
            })?;

        if !signature_matches(signature, &key.secret) {
            warn!(key = %id, "api key signature mismatch");
            return Err(AuthError::InvalidSignature);
        }

        debug!(key = %id, user = %key.name, "validated api key");
        Ok(SessionData {
            username: key.name,
            account: key.account,
            organization: key.organization,
            partner: key.partner,
            ..SessionData::default()
        })
    }

    async fn authenticate_session(&self, token: &str, cookie: &str) -> Result<Authentication> {
        if token.is_empty() && cookie.is_empty() {
            return Ok(Authentication::Rejected(REASON_NO_CREDENTIALS.to_string()));
        }

        let identity = match self
            .bounded("identity provider", self.identity.validate_session(token, cookie))
            .await?
        {
            SessionLookup::Active(identity) => identity,
            SessionLookup::Inactive => return Ok(Authentication::Rejected(REASON_NO_SESSION.to_string())),
            SessionLookup::Unauthenticated => {
                return Ok(Authentication::Rejected(REASON_NO_CREDENTIALS.to_string()))
            }
        };

        let groups = self
            .bounded("group lookup", self.groups.groups_for_identity(&identity.id))
            .await?;

        Ok(Authentication::Authenticated(SessionData {
            username: identity.email,
            account: identity.id,
            organization: identity.organization.unwrap_or_default(),
            partner: identity.partner.unwrap_or_default(),
            groups,
            ..SessionData::default()
        }))
    }

    async fn bounded<T>(&self, collaborator: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(collaborator, self.options.timeout, call).await
    }
}

async fn bounded<T>(
    collaborator: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(collaborator, timeout = ?after, "collaborator call timed out");
            Err(AuthError::Timeout { collaborator, after })
        }
    }
}
