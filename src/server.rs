//!
//! ociauth HTTP server
//! -------------------
//! Axum routes over the auth backend.
//!
//! Responsibilities:
//! - Administrative config and role endpoints, delegating to the stores.
//! - The login endpoint: builds a request context (deadline, retry token, request id)
//!   and returns the narrowed login result.
//! - Role resolution without authentication.
//!
//! A client disconnect drops the handler future, which abandons any in-flight identity
//! call along with it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::backend::{Backend, ConfigEntry, LoginRequest, RoleUpdate};
use crate::error::AppError;
use crate::identity::client::{REQUEST_ID_HEADER, RETRY_TOKEN_HEADER};
use crate::identity::{HttpIdentityClient, IdentityService, RequestContext};
use crate::settings::Settings;
use crate::storage::{FileStorage, InmemStorage, Storage};

type Reply = (StatusCode, Json<Value>);

/// Shared state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    /// Upper bound on the identity calls of a single login.
    pub identity_timeout: Duration,
}

impl AppState {
    pub fn new(backend: Backend, identity_timeout: Duration) -> Self {
        Self { backend: Arc::new(backend), identity_timeout }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ociauth ok" }))
        .route("/v1/config", get(read_config).post(write_config).put(update_config).delete(delete_config))
        .route("/v1/role", get(list_roles))
        .route("/v1/role/{name}", get(read_role).post(write_role).delete(delete_role))
        .route("/v1/login", post(resolve_role))
        .route("/v1/login/{role}", post(login))
        .with_state(state)
}

/// Open storage and the identity client from `settings`, then serve until shutdown.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let storage: Arc<dyn Storage> = match &settings.data_dir {
        Some(dir) => {
            let fs = FileStorage::open(dir)?;
            info!(target: "startup", data_dir = %fs.dir().display(), "using file storage");
            Arc::new(fs)
        }
        None => {
            info!(target: "startup", "no data dir configured; using in-memory storage");
            Arc::new(InmemStorage::new())
        }
    };
    let client = HttpIdentityClient::from_settings(&settings)?;
    info!(target: "startup", identity_url = %client.base_url(), "identity service client ready");
    let identity: Arc<dyn IdentityService> = Arc::new(client);

    let backend = Backend::new(storage, identity, settings.system_ttls());
    let app = router(AppState::new(backend, settings.identity_timeout()));

    let addr: SocketAddr = settings.http_addr.parse()?;
    info!(target: "ociauth::server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_reply(e: &AppError) -> Reply {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(target: "ociauth::server", "request failed: {}", e);
    }
    (status, Json(json!({"status": "error", "code": e.code_str(), "message": e.message()})))
}

fn not_found_reply() -> Reply { (StatusCode::NOT_FOUND, Json(json!({"status": "not_found"}))) }

fn ok_reply(data: Value) -> Reply { (StatusCode::OK, Json(json!({"status": "ok", "data": data}))) }

fn deleted_reply() -> Reply { (StatusCode::OK, Json(json!({"status": "ok"}))) }

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::validation("invalid_body".to_string(), e.body_text()))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

async fn read_config(State(state): State<AppState>) -> Reply {
    match state.backend.config.get().await {
        Ok(Some(cfg)) => ok_reply(cfg.to_response()),
        Ok(None) => not_found_reply(),
        Err(e) => error_reply(&e),
    }
}

async fn write_config(State(state): State<AppState>, payload: Result<Json<ConfigEntry>, JsonRejection>) -> Reply {
    let cfg = match body(payload) { Ok(c) => c, Err(e) => return error_reply(&e) };
    match state.backend.config.write(cfg).await {
        Ok(cfg) => ok_reply(cfg.to_response()),
        Err(e) => error_reply(&e),
    }
}

async fn update_config(State(state): State<AppState>, payload: Result<Json<ConfigEntry>, JsonRejection>) -> Reply {
    let cfg = match body(payload) { Ok(c) => c, Err(e) => return error_reply(&e) };
    match state.backend.config.update(cfg).await {
        Ok(cfg) => ok_reply(cfg.to_response()),
        Err(e) => error_reply(&e),
    }
}

async fn delete_config(State(state): State<AppState>) -> Reply {
    match state.backend.config.delete().await {
        Ok(()) => deleted_reply(),
        Err(e) => error_reply(&e),
    }
}

async fn list_roles(State(state): State<AppState>) -> Reply {
    match state.backend.roles.list().await {
        Ok(keys) => ok_reply(json!({ "keys": keys })),
        Err(e) => error_reply(&e),
    }
}

async fn read_role(State(state): State<AppState>, Path(name): Path<String>) -> Reply {
    match state.backend.roles.get(&name).await {
        Ok(Some(role)) => ok_reply(role.to_response()),
        Ok(None) => not_found_reply(),
        Err(e) => error_reply(&e),
    }
}

async fn write_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<RoleUpdate>, JsonRejection>,
) -> Reply {
    let update = match body(payload) { Ok(u) => u, Err(e) => return error_reply(&e) };
    match state.backend.roles.write(&name, update).await {
        Ok(role) => ok_reply(role.to_response()),
        Err(e) => error_reply(&e),
    }
}

async fn delete_role(State(state): State<AppState>, Path(name): Path<String>) -> Reply {
    match state.backend.roles.delete(&name).await {
        Ok(()) => deleted_reply(),
        Err(e) => error_reply(&e),
    }
}

async fn login(
    State(state): State<AppState>,
    Path(role): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Reply {
    let req = match body(payload) { Ok(r) => r, Err(e) => return error_reply(&e) };
    let mut ctx = RequestContext::default()
        .with_timeout(state.identity_timeout)
        .with_retry_token(req.retry_token.clone().or_else(|| header(&headers, RETRY_TOKEN_HEADER)));
    if let Some(id) = header(&headers, REQUEST_ID_HEADER) {
        ctx.request_id = id;
    }
    match state.backend.login.login(&role, &req, &ctx).await.into_result() {
        Ok(grant) => (StatusCode::OK, Json(json!({"status": "ok", "auth": grant}))),
        Err(e) => error_reply(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ResolvePayload {
    #[serde(default)]
    role: String,
}

async fn resolve_role(State(state): State<AppState>, payload: Result<Json<ResolvePayload>, JsonRejection>) -> Reply {
    let req = match body(payload) { Ok(r) => r, Err(e) => return error_reply(&e) };
    match state.backend.login.resolve_role(&req.role).await {
        Ok(resolved) => ok_reply(json!({ "role": resolved.role })),
        Err(e) => error_reply(&e),
    }
}
