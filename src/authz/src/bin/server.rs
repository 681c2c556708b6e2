//! # Authorization HTTP Server
//!
//! Hosts a [`PolicyRegistry`] behind a small REST API.
//!
//! ## Endpoints
//!
//! - `POST /v1/adapters` - Open a rule store
//! - `POST /v1/enforcers` - Create an enforcer from model text
//! - `POST /v1/enforce` - Decide a request
//! - `GET|POST|DELETE /v1/policies` - Query and edit `p` rules
//! - `GET|POST|DELETE /v1/grouping-policies` - Query and edit `g` rules
//! - `GET /v1/roles/:user` - Direct and inherited roles
//! - `GET /health` - Health check
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `CONNECTION_CONFIG_PATH` - Connection config file
//! - `RUST_LOG` - Log level (default: info)
//!
//! Requests that omit `enforcer` use the domain enforcer created at start-up.

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use kubefleet_authz::{AdapterHandle, AuthzError, EnforcerHandle, PolicyRegistry, Rule};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<PolicyRegistry>,
    default_enforcer: EnforcerHandle,
    start_time: std::time::Instant,
}

impl AppState {
    fn handle(&self, requested: Option<i32>) -> EnforcerHandle {
        requested.map(EnforcerHandle).unwrap_or(self.default_enforcer)
    }
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            e if e.is_not_found() => AppError::NotFound(e.to_string()),
            e @ (AuthzError::InvalidInput(_)
            | AuthzError::InvalidModel(_)
            | AuthzError::InvalidAbac(_)
            | AuthzError::UnsupportedDriver(_)
            | AuthzError::DriverUnavailable(_)) => AppError::BadRequest(e.to_string()),
            e => AppError::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateAdapterRequest {
    #[serde(default)]
    driver: String,
    #[serde(default)]
    connection: String,
    #[serde(default)]
    db_specified: bool,
}

#[derive(Debug, Deserialize)]
struct CreateEnforcerRequest {
    /// Model text; empty reads the configured model file.
    #[serde(default)]
    model: String,
    /// Adapter handle; negative or absent opens the configured store.
    #[serde(default = "no_adapter")]
    adapter: i32,
}

fn no_adapter() -> i32 {
    AdapterHandle::NONE
}

#[derive(Debug, Serialize)]
struct HandleResponse {
    handle: i32,
}

#[derive(Debug, Deserialize)]
struct EnforceRequest {
    enforcer: Option<i32>,
    params: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EnforceResponse {
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct RuleQuery {
    enforcer: Option<i32>,
    ptype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddRulesRequest {
    enforcer: Option<i32>,
    ptype: Option<String>,
    rules: Vec<Rule>,
}

/// Either explicit `rules`, or a filter (`field_index` + `values`).
#[derive(Debug, Deserialize)]
struct RemoveRulesRequest {
    enforcer: Option<i32>,
    ptype: Option<String>,
    #[serde(default)]
    rules: Vec<Rule>,
    field_index: Option<usize>,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChangedResponse {
    changed: bool,
}

#[derive(Debug, Serialize)]
struct RulesResponse {
    rules: Vec<Rule>,
}

#[derive(Debug, Serialize)]
struct RolesResponse {
    user: String,
    roles: Vec<String>,
    implicit_roles: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
    enforcers: usize,
    adapters: usize,
}

/// POST /v1/adapters
async fn create_adapter(
    State(state): State<AppState>,
    Json(req): Json<CreateAdapterRequest>,
) -> Result<Json<HandleResponse>, AppError> {
    let handle = state
        .registry
        .create_adapter(&req.driver, &req.connection, req.db_specified)
        .await?;
    Ok(Json(HandleResponse { handle: handle.0 }))
}

/// POST /v1/enforcers
async fn create_enforcer(
    State(state): State<AppState>,
    Json(req): Json<CreateEnforcerRequest>,
) -> Result<Json<HandleResponse>, AppError> {
    let adapter = AdapterHandle::from_raw(req.adapter);
    let handle = state.registry.create_enforcer(&req.model, adapter).await?;
    Ok(Json(HandleResponse { handle: handle.0 }))
}

/// POST /v1/enforce
async fn enforce(
    State(state): State<AppState>,
    Json(req): Json<EnforceRequest>,
) -> Result<Json<EnforceResponse>, AppError> {
    let handle = state.handle(req.enforcer);
    let allowed = state.registry.enforce(handle, &req.params).await?;
    info!(%handle, allowed, "enforce");
    Ok(Json(EnforceResponse { allowed }))
}

async fn list_rules(state: &AppState, query: RuleQuery, default_ptype: &str) -> Result<Json<RulesResponse>, AppError> {
    let ptype = query.ptype.as_deref().unwrap_or(default_ptype);
    let rules = state
        .registry
        .get_named_policy(state.handle(query.enforcer), ptype)
        .await?;
    Ok(Json(RulesResponse { rules }))
}

async fn add_rules(state: &AppState, req: AddRulesRequest, default_ptype: &str) -> Result<Json<ChangedResponse>, AppError> {
    let ptype = req.ptype.as_deref().unwrap_or(default_ptype);
    let changed = state
        .registry
        .add_named_policies(state.handle(req.enforcer), ptype, req.rules)
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn remove_rules(
    state: &AppState,
    req: RemoveRulesRequest,
    default_ptype: &str,
) -> Result<Json<ChangedResponse>, AppError> {
    let handle = state.handle(req.enforcer);
    let ptype = req.ptype.as_deref().unwrap_or(default_ptype);
    let changed = match req.field_index {
        Some(field_index) => {
            state
                .registry
                .remove_filtered_named_policy(handle, ptype, field_index, &req.values)
                .await?
        }
        None if req.rules.is_empty() => {
            return Err(AppError::BadRequest("either rules or field_index is required".to_string()))
        }
        None => state.registry.remove_named_policies(handle, ptype, req.rules).await?,
    };
    Ok(Json(ChangedResponse { changed }))
}

/// GET /v1/policies
async fn get_policies(State(state): State<AppState>, Query(query): Query<RuleQuery>) -> Result<Json<RulesResponse>, AppError> {
    list_rules(&state, query, "p").await
}

/// POST /v1/policies
async fn add_policies(
    State(state): State<AppState>,
    Json(req): Json<AddRulesRequest>,
) -> Result<Json<ChangedResponse>, AppError> {
    add_rules(&state, req, "p").await
}

/// DELETE /v1/policies
async fn remove_policies(
    State(state): State<AppState>,
    Json(req): Json<RemoveRulesRequest>,
) -> Result<Json<ChangedResponse>, AppError> {
    remove_rules(&state, req, "p").await
}

/// GET /v1/grouping-policies
async fn get_grouping_policies(
    State(state): State<AppState>,
    Query(query): Query<RuleQuery>,
) -> Result<Json<RulesResponse>, AppError> {
    list_rules(&state, query, "g").await
}

/// POST /v1/grouping-policies
async fn add_grouping_policies(
    State(state): State<AppState>,
    Json(req): Json<AddRulesRequest>,
) -> Result<Json<ChangedResponse>, AppError> {
    add_rules(&state, req, "g").await
}

/// DELETE /v1/grouping-policies
async fn remove_grouping_policies(
    State(state): State<AppState>,
    Json(req): Json<RemoveRulesRequest>,
) -> Result<Json<ChangedResponse>, AppError> {
    remove_rules(&state, req, "g").await
}

/// GET /v1/roles/:user
async fn get_roles(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<RuleQuery>,
) -> Result<Json<RolesResponse>, AppError> {
    let handle = state.handle(query.enforcer);
    let ptype = query.ptype.as_deref().unwrap_or("g");
    let roles = state.registry.get_named_roles_for_user(handle, ptype, &user).await?;
    let implicit_roles = state
        .registry
        .get_named_implicit_roles_for_user(handle, ptype, &user)
        .await?;
    Ok(Json(RolesResponse {
        user,
        roles,
        implicit_roles,
    }))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: kubefleet_authz::VERSION.to_string(),
        enforcers: state.registry.enforcer_count(),
        adapters: state.registry.adapter_count(),
    })
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/adapters", post(create_adapter))
        .route("/v1/enforcers", post(create_enforcer))
        .route("/v1/enforce", post(enforce))
        .route(
            "/v1/policies",
            get(get_policies).post(add_policies).delete(remove_policies),
        )
        .route(
            "/v1/grouping-policies",
            get(get_grouping_policies)
                .post(add_grouping_policies)
                .delete(remove_grouping_policies),
        )
        .route("/v1/roles/:user", get(get_roles))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting KubeFleet Authorization Server v{}", kubefleet_authz::VERSION);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let registry = Arc::new(PolicyRegistry::from_env());
    info!(
        driver = %registry.config().driver,
        model = %registry.config().enforcer,
        "Connection config loaded"
    );

    let default_enforcer = registry
        .create_domain_enforcer(None)
        .await
        .context("domain enforcer initialization failed")?;
    info!(handle = %default_enforcer, "Domain enforcer ready");

    let state = AppState {
        registry,
        default_enforcer,
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let registry = Arc::new(PolicyRegistry::default());
        let default_enforcer = registry.create_domain_enforcer(None).await.unwrap();
        AppState {
            registry,
            default_enforcer,
            start_time: std::time::Instant::now(),
        }
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state().await);
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["enforcers"], 1);
    }

    #[tokio::test]
    async fn test_domain_policy_lifecycle() {
        let app = create_router(test_state().await);
        let request = json!({
            "params": ["alice", "default", "web", "acme", "/v3/clusters/c1", "GET"]
        });

        let (_, body) = call(&app, Method::POST, "/v1/enforce", Some(request.clone())).await;
        assert_eq!(body["allowed"], false);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/policies",
            Some(json!({ "rules": [["reader", "*", "*", "acme", "cluster.read"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);

        call(
            &app,
            Method::POST,
            "/v1/grouping-policies",
            Some(json!({ "rules": [["/v3/clusters/:cluster", "cluster.read", "GET"]] })),
        )
        .await;

        call(
            &app,
            Method::POST,
            "/v1/grouping-policies",
            Some(json!({ "ptype": "g2", "rules": [["alice", "reader"]] })),
        )
        .await;

        let (_, body) = call(&app, Method::POST, "/v1/enforce", Some(request.clone())).await;
        assert_eq!(body["allowed"], true);

        let (_, body) = call(&app, Method::GET, "/v1/roles/alice?ptype=g2", None).await;
        assert_eq!(body["roles"], json!(["reader"]));

        let (_, body) = call(
            &app,
            Method::DELETE,
            "/v1/grouping-policies",
            Some(json!({ "ptype": "g2", "field_index": 0, "values": ["alice"] })),
        )
        .await;
        assert_eq!(body["changed"], true);

        let (_, body) = call(&app, Method::POST, "/v1/enforce", Some(request)).await;
        assert_eq!(body["allowed"], false);
    }

    #[tokio::test]
    async fn test_errors_map_to_status() {
        let app = create_router(test_state().await);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/enforce",
            Some(json!({ "enforcer": 9, "params": ["a", "b", "c"] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/adapters",
            Some(json!({ "driver": "oracle", "connection": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::DELETE, "/v1/policies", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_enforcer() {
        let app = create_router(test_state().await);
        let model = "[request_definition]\nr = sub, obj, act\n[policy_definition]\np = sub, obj, act\n\
            [policy_effect]\ne = some(where (p.eft == allow))\n\
            [matchers]\nm = r.sub == p.sub && r.obj == p.obj && r.act == p.act\n";

        let (status, body) = call(&app, Method::POST, "/v1/enforcers", Some(json!({ "model": model }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["handle"], 1);

        call(
            &app,
            Method::POST,
            "/v1/policies",
            Some(json!({ "enforcer": 1, "rules": [["bob", "data", "read"]] })),
        )
        .await;
        let (_, body) = call(&app, Method::GET, "/v1/policies?enforcer=1", None).await;
        assert_eq!(body["rules"], json!([["bob", "data", "read"]]));
    }
}
