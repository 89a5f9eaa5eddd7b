//! In-process mock of the conversion backend.
//!
//! Serves the real HTTP surface the client consumes, with per-endpoint
//! failure toggles and call counters so tests can inject faults and assert
//! on traffic. Tokens are minted on login/refresh; the refresh credential
//! rides an HTTP-only cookie exactly like the production backend.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PASSWORD: &str = "secret";
const REFRESH_COOKIE: &str = "refresh_token=rt-1";

/// Convert form fields recorded for assertions.
#[derive(Debug, Clone, Default)]
pub struct ConvertRecord {
    pub session_id: String,
    pub output_format: String,
    pub groups: Vec<String>,
}

#[derive(Default)]
pub struct BackendState {
    token_counter: AtomicUsize,
    valid_tokens: Mutex<HashSet<String>>,
    refresh_cookie_issued: AtomicBool,
    sessions: Mutex<HashSet<String>>,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub clear_memory_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub scan_calls: AtomicUsize,
    pub convert_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub preview_calls: AtomicUsize,
    pub download_all_calls: AtomicUsize,
    pub download_modified_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,

    pub fail_scan: AtomicBool,
    pub fail_convert: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_preview: AtomicBool,
    pub fail_cleanup: AtomicBool,
    pub fail_logout: AtomicBool,
    pub fail_clear_memory: AtomicBool,
    pub fail_refresh_server_error: AtomicBool,
    pub scan_delay_ms: AtomicU64,

    pub last_convert: Mutex<Option<ConvertRecord>>,
    pub last_preview_max_rows: AtomicU64,
}

impl BackendState {
    /// Expire every outstanding access token; the refresh credential stays
    /// valid, so the next refresh mints a working replacement.
    pub fn invalidate_tokens(&self) {
        self.valid_tokens.lock().unwrap().clear();
    }

    /// Revoke the refresh credential as well, so refresh returns 401.
    pub fn revoke_refresh_credential(&self) {
        self.refresh_cookie_issued.store(false, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn mint_token(&self) -> String {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst);
        let token = format!("tok-{n}");
        self.valid_tokens.lock().unwrap().insert(token.clone());
        token
    }

    fn is_valid_bearer(&self, headers: &HeaderMap) -> bool {
        let Some(token) = bearer_token(headers) else {
            return false;
        };
        self.valid_tokens.lock().unwrap().contains(&token)
    }
}

type Shared = Arc<BackendState>;

/// Bind the mock backend on an ephemeral port and return its base URL.
pub async fn spawn_backend() -> (Shared, String) {
    let state: Shared = Arc::new(BackendState::default());
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock backend");
    });

    (state, format!("http://{addr}"))
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/ai/clear-memory/:session_id", post(clear_memory))
        .route("/conversion/scan", post(scan))
        .route("/conversion/convert", post(convert))
        .route("/conversion/files/:session_id", get(list_files))
        .route("/conversion/preview/:session_id/:filename", get(preview))
        .route("/conversion/download/:session_id", get(download_all))
        .route(
            "/conversion/download-modified/:session_id",
            get(download_modified),
        )
        .route(
            "/conversion/download-file/:session_id/:filename",
            get(download_file),
        )
        .route(
            "/conversion/download-group/:session_id/:group",
            get(download_group),
        )
        .route("/conversion/cleanup/:session_id", post(cleanup))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn unauthorized() -> Response {
    detail(StatusCode::UNAUTHORIZED, "Not authenticated")
}

fn user_body() -> serde_json::Value {
    json!({ "username": "tester", "role": "admin", "session_id": "chat-1" })
}

//-- Auth endpoints

async fn login(State(state): State<Shared>, Json(body): Json<serde_json::Value>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);

    if body["password"].as_str() != Some(PASSWORD) {
        return detail(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let token = state.mint_token();
    state.refresh_cookie_issued.store(true, Ordering::SeqCst);

    (
        [(
            header::SET_COOKIE,
            format!("{REFRESH_COOKIE}; HttpOnly; Path=/"),
        )],
        Json(json!({ "access_token": token, "user": user_body() })),
    )
        .into_response()
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    if state.fail_refresh_server_error.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "refresh backend down");
    }

    let cookie_present = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains(REFRESH_COOKIE));

    if !cookie_present || !state.refresh_cookie_issued.load(Ordering::SeqCst) {
        return unauthorized();
    }

    let token = state.mint_token();
    Json(json!({ "access_token": token })).into_response()
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.me_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    Json(user_body()).into_response()
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);

    if state.fail_logout.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "logout backend down");
    }

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    StatusCode::OK.into_response()
}

async fn clear_memory(
    State(state): State<Shared>,
    Path(_session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.clear_memory_calls.fetch_add(1, Ordering::SeqCst);

    if state.fail_clear_memory.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "memory backend down");
    }

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    StatusCode::OK.into_response()
}

//-- Conversion endpoints

async fn scan(
    State(state): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.scan_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    let delay = state.scan_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let mut got_file = false;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            got_file = field.bytes().await.is_ok();
        }
    }
    if !got_file {
        return detail(StatusCode::BAD_REQUEST, "missing file field");
    }

    if state.fail_scan.load(Ordering::SeqCst) {
        return detail(StatusCode::BAD_REQUEST, "Archive is empty");
    }

    let session_id = format!("sess-{}", uuid::Uuid::new_v4());
    state.sessions.lock().unwrap().insert(session_id.clone());

    Json(json!({
        "session_id": session_id,
        "groups": [
            { "name": "orders", "file_count": 2, "size": 1200 },
            { "name": "customers", "file_count": 1, "size": 300 },
        ],
        "xml_count": 3,
    }))
    .into_response()
}

async fn convert(
    State(state): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.convert_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    let mut record = ConvertRecord::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.unwrap_or_default();
        match name.as_str() {
            "session_id" => record.session_id = value,
            "output_format" => record.output_format = value,
            "groups" => record.groups.push(value),
            _ => {}
        }
    }
    *state.last_convert.lock().unwrap() = Some(record);

    if state.fail_convert.load(Ordering::SeqCst) {
        return Json(json!({ "success": false })).into_response();
    }

    Json(json!({ "success": true, "stats": { "converted": 3 } })).into_response()
}

async fn list_files(
    State(state): State<Shared>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    if state.fail_list.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "listing unavailable");
    }

    if !state.sessions.lock().unwrap().contains(&session_id) {
        return detail(StatusCode::NOT_FOUND, "unknown session");
    }

    Json(json!({
        "groups": [
            { "name": "orders", "file_count": 2, "size": 1200 },
            { "name": "customers", "file_count": 1, "size": 300 },
        ],
        "files": [
            { "filename": "orders_1.csv", "group": "orders" },
            { "filename": "orders_2.csv", "group": "orders" },
            { "filename": "customers_1.csv", "group": "customers" },
        ],
        "total_files": 3,
    }))
    .into_response()
}

async fn preview(
    State(state): State<Shared>,
    Path((_session_id, filename)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.preview_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    if let Some(max_rows) = params.get("max_rows").and_then(|v| v.parse().ok()) {
        state.last_preview_max_rows.store(max_rows, Ordering::SeqCst);
    }

    if state.fail_preview.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "preview unavailable");
    }

    Json(json!({
        "columns": ["id", "amount"],
        "rows": [[1, 10], [2, 20]],
        "total_rows": 2,
        "filename": filename,
    }))
    .into_response()
}

async fn download_all(
    State(state): State<Shared>,
    Path(_session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.download_all_calls.fetch_add(1, Ordering::SeqCst);
    binary_response(&state, &headers, b"all-archive".to_vec())
}

async fn download_modified(
    State(state): State<Shared>,
    Path(_session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.download_modified_calls.fetch_add(1, Ordering::SeqCst);
    binary_response(&state, &headers, b"modified-archive".to_vec())
}

async fn download_file(
    State(state): State<Shared>,
    Path((_session_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    binary_response(&state, &headers, format!("file:{filename}").into_bytes())
}

async fn download_group(
    State(state): State<Shared>,
    Path((_session_id, group)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    binary_response(&state, &headers, format!("group:{group}").into_bytes())
}

fn binary_response(state: &BackendState, headers: &HeaderMap, body: Vec<u8>) -> Response {
    if !state.is_valid_bearer(headers) {
        return unauthorized();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    )
        .into_response()
}

async fn cleanup(
    State(state): State<Shared>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.cleanup_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_valid_bearer(&headers) {
        return unauthorized();
    }

    if state.fail_cleanup.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "cleanup failed");
    }

    state.sessions.lock().unwrap().remove(&session_id);
    StatusCode::OK.into_response()
}
