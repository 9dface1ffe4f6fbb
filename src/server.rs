//!
//! alcove HTTP server
//! ------------------
//! Axum JSON API over the mirror, engagement and auth services.
//!
//! Responsibilities:
//! - Session management with a cookie + per-session CSRF token model.
//! - Anonymous browsing: directory listings that reconcile the media tree on
//!   read, plus file and directory detail payloads.
//! - Authenticated engagement: like toggles, ratings, comments.
//! - Account endpoints: register, login/logout, profile, password change and
//!   the mailed password-reset flow.
//! - Role-gated metadata editing and comment moderation (Admin/Editor).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::{require_any_role, AuthService, AuthUser, LoginOutcome, SessionManager};
use crate::config::Config;
use crate::engagement::Engagement;
use crate::error::{AppError, AppResult};
use crate::mail::Mailer;
use crate::mirror::Mirror;
use crate::store::{DirectoryMetaPatch, FileMetaPatch, Store};

const SESSION_COOKIE: &str = "alcove_session";

/// Roles allowed to edit metadata and moderate comments.
const EDITOR_ROLES: &[&str] = &["Admin", "Editor"];

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub mirror: Mirror,
    pub engagement: Engagement,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Builds the full service stack over an already-open store.
    pub fn new(store: Store, config: &Config) -> Self {
        let mailer = Arc::new(Mailer::from_config(config));
        AppState {
            mirror: Mirror::new(config.media_root.clone(), store.clone()),
            engagement: Engagement::new(store.clone()),
            auth: Arc::new(AuthService::new(store.clone(), config, mailer)),
            sessions: Arc::new(SessionManager::new(Duration::from_secs(
                config.session_ttl_secs,
            ))),
            store,
        }
    }
}

fn log_startup(config: &Config) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "alcove starting. cwd={:?}, media_root={:?}, db_path={:?}, http_port={}",
        cwd, config.media_root, config.db_path, config.http_port
    );
    if !config.media_root.is_dir() {
        tracing::warn!(
            "media root {:?} is not a directory; browsing will 404 until it exists",
            config.media_root
        );
    }
}

/// Opens the database, assembles the services and serves HTTP until the
/// process is stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    use anyhow::Context;

    log_startup(&config);

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {parent:?}"))?;
        }
    }
    let store = Store::open(&config.db_path).await?;
    let state = AppState::new(store, &config);
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(browse_root))
        .route("/browse", get(browse_root))
        .route("/browse/{*path}", get(browse))
        .route("/file/{id}", get(file_detail))
        .route("/file/{id}/metadata", post(edit_file_metadata))
        .route("/file/{id}/like", post(toggle_like))
        .route("/file/{id}/rating", post(submit_rating))
        .route("/file/{id}/comments", post(add_comment))
        .route("/directory/{id}", get(directory_detail))
        .route("/directory/{id}/metadata", post(edit_directory_metadata))
        .route("/comments/{id}/delete", post(delete_comment))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/csrf", get(get_csrf))
        .route("/profile", get(profile))
        .route("/change-password", post(change_password))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/{token}", post(reset_password))
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.code_str(), "request failed: {}", self.message());
        }
        let body = Json(json!({
            "status": "error",
            "code": self.code_str(),
            "error": self.message(),
        }));
        (status, body).into_response()
    }
}

// ---- session plumbing -------------------------------------------------------

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

/// The viewer behind the request's session cookie, if any. Stale sessions and
/// since-disabled accounts resolve to None rather than erroring.
async fn current_user(state: &AppState, headers: &HeaderMap) -> AppResult<Option<AuthUser>> {
    let Some(sid) = session_id(headers) else {
        return Ok(None);
    };
    let Some(user_id) = state.sessions.resolve(&sid) else {
        return Ok(None);
    };
    state.auth.load_user(user_id).await
}

async fn require_user(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    current_user(state, headers)
        .await?
        .ok_or_else(|| AppError::auth("not_authenticated", "you must be logged in"))
}

fn require_csrf(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(sid) = session_id(headers) else {
        return Err(csrf_denied());
    };
    let Some(provided) = headers.get("x-csrf-token").and_then(|v| v.to_str().ok()) else {
        return Err(csrf_denied());
    };
    if state.sessions.csrf_matches(&sid, provided) {
        Ok(())
    } else {
        Err(csrf_denied())
    }
}

fn csrf_denied() -> AppError {
    AppError::forbidden("csrf_invalid", "missing or invalid CSRF token")
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={sid}; HttpOnly; Secure; SameSite=Strict; Path=/"
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/"
    ))
    .unwrap()
}

fn file_missing(id: i64) -> AppError {
    AppError::not_found("file_missing", format!("no file with id {id}"))
}

// ---- browsing ---------------------------------------------------------------

async fn browse_root(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    browse_listing(&state, &headers, "").await
}

async fn browse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> AppResult<Json<Value>> {
    browse_listing(&state, &headers, &path).await
}

/// Reconciles the directory on read and returns its files decorated with
/// engagement aggregates for the current viewer.
async fn browse_listing(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
) -> AppResult<Json<Value>> {
    let viewer = current_user(state, headers).await?;
    let (directory, files) = state.mirror.reconcile(path).await?;
    let files = state
        .engagement
        .decorate_files(files, viewer.as_ref().map(|u| u.id))
        .await?;
    Ok(Json(json!({
        "status": "ok",
        "directory": directory,
        "files": files,
    })))
}

async fn file_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let viewer = current_user(&state, &headers).await?;
    let Some(file) = state.store.file_by_id(id).await? else {
        return Err(file_missing(id));
    };
    let viewer_id = viewer.as_ref().map(|u| u.id);
    let rating = state.engagement.rating_summary(id).await?;
    let liked = state.engagement.has_liked(id, viewer_id).await?;
    let likes = state.engagement.like_count(id).await?;
    let viewer_rating = match viewer_id {
        Some(uid) => state.engagement.user_rating(id, uid).await?,
        None => None,
    };
    let comments = state.engagement.comments_for_file(id).await?;
    Ok(Json(json!({
        "status": "ok",
        "file": file,
        "rating": rating,
        "likes": likes,
        "liked": liked,
        "viewer_rating": viewer_rating,
        "comments": comments,
    })))
}

async fn directory_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let Some(directory) = state.store.directory_by_id(id).await? else {
        return Err(AppError::not_found(
            "directory_missing",
            format!("no directory with id {id}"),
        ));
    };
    Ok(Json(json!({ "status": "ok", "directory": directory })))
}

// ---- metadata editing (role gated) -----------------------------------------

async fn edit_file_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<FileMetaPatch>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    require_any_role(&user, EDITOR_ROLES)?;
    if !state.store.update_file_meta(id, &patch).await? {
        return Err(file_missing(id));
    }
    info!(user = %user.username, file = id, "file metadata updated");
    Ok(Json(json!({ "status": "ok" })))
}

async fn edit_directory_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<DirectoryMetaPatch>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    require_any_role(&user, EDITOR_ROLES)?;
    if patch.title.as_deref().is_some_and(|t| t.chars().count() > 255) {
        return Err(AppError::validation(
            "too_long",
            "title must be at most 255 characters",
        ));
    }
    if patch.image_path.as_deref().is_some_and(|p| p.chars().count() > 500) {
        return Err(AppError::validation(
            "too_long",
            "image path must be at most 500 characters",
        ));
    }
    if !state.store.update_directory_meta(id, &patch).await? {
        return Err(AppError::not_found(
            "directory_missing",
            format!("no directory with id {id}"),
        ));
    }
    info!(user = %user.username, directory = id, "directory metadata updated");
    Ok(Json(json!({ "status": "ok" })))
}

// ---- engagement -------------------------------------------------------------

async fn toggle_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    if state.store.file_by_id(id).await?.is_none() {
        return Err(file_missing(id));
    }
    let outcome = state
        .engagement
        .toggle_like(id, user.id, &addr.ip().to_string())
        .await?;
    Ok(Json(json!({ "status": "ok", "like": outcome.as_str() })))
}

#[derive(Debug, Deserialize)]
struct RatingPayload {
    rating: i64,
}

async fn submit_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
    Json(payload): Json<RatingPayload>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    if state.store.file_by_id(id).await?.is_none() {
        return Err(file_missing(id));
    }
    state
        .engagement
        .upsert_rating(id, user.id, payload.rating, &addr.ip().to_string())
        .await?;
    let rating = state.engagement.rating_summary(id).await?;
    Ok(Json(json!({ "status": "ok", "rating": rating })))
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    comment: String,
}

async fn add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
    Json(payload): Json<CommentPayload>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    if state.store.file_by_id(id).await?.is_none() {
        return Err(file_missing(id));
    }
    let comment = state
        .engagement
        .add_comment(
            id,
            user.id,
            &user.username,
            &payload.comment,
            &addr.ip().to_string(),
        )
        .await?;
    Ok(Json(json!({ "status": "ok", "comment": comment })))
}

async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    require_any_role(&user, EDITOR_ROLES)?;
    state.engagement.delete_comment(id).await?;
    info!(user = %user.username, comment = id, "comment deleted");
    Ok(Json(json!({ "status": "ok" })))
}

// ---- accounts ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    email: String,
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> AppResult<Json<Value>> {
    let user = state
        .auth
        .register(&payload.email, &payload.username, &payload.password)
        .await?;
    Ok(Json(json!({ "status": "ok", "user": user })))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    identifier: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Response> {
    match state.auth.login(&payload.identifier, &payload.password).await? {
        LoginOutcome::Granted(user) => {
            let session = state.sessions.issue(user.id)?;
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&session.id));
            info!(user = %user.username, "login ok");
            Ok((
                StatusCode::OK,
                headers,
                Json(json!({ "status": "ok", "user": user })),
            )
                .into_response())
        }
        LoginOutcome::Denied(denied) => Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "error",
                "error": "invalid credentials",
                "field": denied.field(),
            })),
        )
            .into_response()),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    require_csrf(&state, &headers)?;
    if let Some(sid) = session_id(&headers) {
        state.sessions.revoke(&sid);
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    Ok((StatusCode::OK, h, Json(json!({ "status": "ok" }))).into_response())
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let token = session_id(&headers)
        .and_then(|sid| state.sessions.csrf_for(&sid))
        .ok_or_else(|| AppError::internal("csrf", "csrf token not available"))?;
    Ok(Json(json!({ "status": "ok", "csrf": token })))
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    Ok(Json(json!({ "status": "ok", "user": user })))
}

#[derive(Debug, Deserialize)]
struct ChangePasswordPayload {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordPayload>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_csrf(&state, &headers)?;
    state
        .auth
        .change_password(
            user.id,
            &payload.current_password,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct ForgotPasswordPayload {
    email: String,
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordPayload>,
) -> AppResult<Json<Value>> {
    let masked = state.auth.request_password_reset(&payload.email).await?;
    Ok(Json(json!({ "status": "ok", "email": masked })))
}

#[derive(Debug, Deserialize)]
struct ResetPasswordPayload {
    password: String,
    confirm_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordPayload>,
) -> AppResult<Json<Value>> {
    state
        .auth
        .reset_password(&token, &payload.password, &payload.confirm_password)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}
