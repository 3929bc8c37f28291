//! Drives the reqwest transport against a stub of the REST API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::json;

use trackitnow::api::http::HttpTransport;
use trackitnow::api::FilePart;
use trackitnow::storage::{FileTokenStorage, TokenStorage};
use trackitnow::{auth, profile, ApiClient, ApiError, SessionPhase, SessionStore};

const VALID_TOKEN: &str = "tok-1";

// ── Stub server ───────────────────────────────────────────────────────────────

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer tok-1")
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Could not validate credentials" }))).into_response()
}

async fn signin_handler(Form(form): Form<HashMap<String, String>>) -> Response {
    let email = form.get("username").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    if email == Some("ada@example.com") && password == Some("hunter22") {
        Json(json!({ "access_token": VALID_TOKEN, "token_type": "bearer" })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Incorrect email or password" }))).into_response()
    }
}

async fn profile_handler(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": 1,
        "email": "ada@example.com",
        "username": "ada",
        "display_name": "Ada",
        "created_at": "2025-01-01T00:00:00",
        "total_points": 120,
        "streak": 4
    }))
    .into_response()
}

async fn search_handler(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let q = params.get("q").cloned().unwrap_or_default();
    Json(json!([{
        "id": 2,
        "email": "echo@example.com",
        "username": "echo",
        "display_name": q,
        "created_at": ""
    }]))
    .into_response()
}

async fn photo_handler(headers: HeaderMap, mut multipart: Multipart) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime = field.content_type().unwrap_or_default().to_string();
        let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        return Json(json!({ "avatar_url": format!("/uploads/{file_name}?type={mime}&size={size}") }))
            .into_response();
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": [{ "msg": "field required" }] }))).into_response()
}

async fn read_handler(headers: HeaderMap, Path(chat_id): Path<i64>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if chat_id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Chat not found" }))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/api/auth/signin", post(signin_handler))
        .route("/api/user/profile", get(profile_handler))
        .route("/api/user/profile/photo", post(photo_handler))
        .route("/api/friends/search", get(search_handler))
        .route("/api/chats/{id}/read", put(read_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn session_at(base_url: &str, tokens: Arc<FileTokenStorage>) -> SessionStore<HttpTransport> {
    let transport = HttpTransport::new(base_url, Duration::from_secs(5)).unwrap();
    SessionStore::in_memory(ApiClient::new(transport, tokens))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sign_in_persists_the_token_across_restarts() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));

    let session = session_at(&base_url, tokens.clone());
    session.bootstrap().await;
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);

    auth::sign_in(&session, "ada@example.com", "hunter22").await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Authenticated);
    assert_eq!(tokens.load().unwrap().as_deref(), Some(VALID_TOKEN));

    let restarted = session_at(&base_url, Arc::new(FileTokenStorage::new(dir.path())));
    restarted.bootstrap().await;
    assert_eq!(restarted.phase(), SessionPhase::Authenticated);
    assert_eq!(restarted.user().unwrap().streak, 4);
}

#[tokio::test]
async fn bad_credentials_surface_the_server_detail() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let session = session_at(&base_url, Arc::new(FileTokenStorage::new(dir.path())));
    session.bootstrap().await;

    let err = auth::sign_in(&session, "ada@example.com", "nope").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.user_message(auth::SIGN_IN_FALLBACK), "Incorrect email or password");
}

#[tokio::test]
async fn stale_stored_token_is_cleared_on_bootstrap() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));
    tokens.store("stale").unwrap();

    let session = session_at(&base_url, tokens.clone());
    session.bootstrap().await;

    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    assert_eq!(tokens.load().unwrap(), None);
}

#[tokio::test]
async fn search_query_is_url_encoded() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));
    tokens.store(VALID_TOKEN).unwrap();
    let session = session_at(&base_url, tokens);

    let users = session.api().search_users("ada & grace").await.unwrap();

    assert_eq!(users[0].display_name, "ada & grace");
}

#[tokio::test]
async fn avatar_is_sent_as_multipart_file_field() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));
    tokens.store(VALID_TOKEN).unwrap();
    let session = session_at(&base_url, tokens);
    session.bootstrap().await;

    let url = profile::upload_avatar(&session, FilePart::new("me.png", "image/png", vec![7; 32]))
        .await
        .unwrap();

    assert_eq!(url, "/uploads/me.png?type=image/png&size=32");
}

#[tokio::test]
async fn empty_success_body_and_error_detail() {
    let base_url = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));
    tokens.store(VALID_TOKEN).unwrap();
    let session = session_at(&base_url, tokens);

    assert!(session.api().mark_read(3).await.is_ok());

    let err = session.api().mark_read(404).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.user_message("Could not mark as read"), "Chat not found");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStorage::new(dir.path()));
    tokens.store(VALID_TOKEN).unwrap();
    let session = session_at(&format!("http://{addr}"), tokens.clone());
    session.bootstrap().await;

    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    assert_eq!(tokens.load().unwrap(), None);
    assert!(matches!(session.api().profile().await, Err(ApiError::Network(_))));
}
