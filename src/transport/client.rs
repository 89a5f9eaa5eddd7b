//! HTTP client for the conversion backend.
//!
//! Every authenticated call runs through [`ApiClient::execute`], which
//! injects the current bearer token and, on the first 401, performs exactly
//! one refresh attempt before retrying the call once. Concurrent 401s
//! serialize on a single refresh gate so only one refresh request reaches
//! the backend. The refresh credential itself rides an HTTP-only cookie in
//! the client's cookie store and is never read by this code.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::{AuthStore, User};
use crate::common::config::ApiSettings;
use crate::common::{AppError, AuthError, NotificationSink};
use crate::transport::responses::{
    ConvertResponse, ErrorBody, FileListResponse, FilePreview, LoginResponse, RefreshResponse,
    ScanResponse,
};

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthStore,
    notices: NotificationSink,
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings, auth: AuthStore, notices: NotificationSink) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth,
            notices,
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    //-- Auth endpoints

    /// Exchange credentials for an access token and user record.
    /// Not routed through the 401 interceptor: a 401 here means the
    /// credentials are wrong, not that a token expired.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AppError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<LoginResponse>()
                .await
                .map_err(|err| AuthError::Network(format!("invalid login response: {err}")).into()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::InvalidCredentials.into())
            }
            _ => Err(AuthError::Network(extract_error_message(response).await).into()),
        }
    }

    pub async fn fetch_me(&self) -> Result<User, AppError> {
        let response = self
            .execute(|http, token| with_bearer(http.get(self.url("/auth/me")), token))
            .await?;
        let response = ensure_success(response).await?;
        response
            .json::<User>()
            .await
            .map_err(|err| AppError::Transport(format!("invalid user response: {err}")))
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        let response = self
            .execute(|http, token| with_bearer(http.post(self.url("/auth/logout")), token))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn clear_memory(&self, session_id: &str) -> Result<(), AppError> {
        let path = format!("/ai/clear-memory/{session_id}");
        let response = self
            .execute(|http, token| with_bearer(http.post(self.url(&path)), token))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Exchange the cookie-borne refresh credential for a new access token.
    ///
    /// Success stores the new token and returns true. A 401 is the expected
    /// no-active-credential case and clears identity silently; every other
    /// failure clears identity and surfaces a notice. Never calls logout.
    pub async fn refresh(&self) -> bool {
        let result = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&serde_json::json!({}))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.refresh_failed(err.to_string()),
        };

        match response.status() {
            status if status.is_success() => match response.json::<RefreshResponse>().await {
                Ok(body) => {
                    self.auth.set_token(body.access_token);
                    tracing::debug!("Access token refreshed");
                    true
                }
                Err(err) => self.refresh_failed(format!("invalid refresh response: {err}")),
            },
            StatusCode::UNAUTHORIZED => {
                // Expected when no refresh credential exists yet
                self.auth.clear();
                tracing::debug!("Refresh rejected: no active refresh credential");
                false
            }
            _ => {
                let message = extract_error_message(response).await;
                self.refresh_failed(message)
            }
        }
    }

    fn refresh_failed(&self, message: String) -> bool {
        self.auth.clear();
        tracing::warn!("Token refresh failed: {message}");
        self.notices.error(format!("Session refresh failed: {message}"));
        false
    }

    //-- Conversion endpoints

    pub async fn scan(&self, filename: &str, bytes: Vec<u8>) -> Result<ScanResponse, AppError> {
        let response = self
            .execute(|http, token| {
                let part = Part::bytes(bytes.clone()).file_name(filename.to_string());
                let form = Form::new().part("file", part);
                with_bearer(http.post(self.url("/conversion/scan")), token).multipart(form)
            })
            .await?;
        let response = ensure_success(response).await?;
        parse_json(response, "scan").await
    }

    pub async fn convert(
        &self,
        session_id: &str,
        output_format: &str,
        groups: &[String],
    ) -> Result<ConvertResponse, AppError> {
        let response = self
            .execute(|http, token| {
                let mut form = Form::new()
                    .text("session_id", session_id.to_string())
                    .text("output_format", output_format.to_string());
                for group in groups {
                    form = form.text("groups", group.clone());
                }
                with_bearer(http.post(self.url("/conversion/convert")), token).multipart(form)
            })
            .await?;
        let response = ensure_success(response).await?;
        parse_json(response, "convert").await
    }

    pub async fn list_files(&self, session_id: &str) -> Result<FileListResponse, AppError> {
        let path = format!("/conversion/files/{session_id}");
        let response = self
            .execute(|http, token| with_bearer(http.get(self.url(&path)), token))
            .await?;
        let response = ensure_success(response).await?;
        parse_json(response, "file listing").await
    }

    pub async fn preview(
        &self,
        session_id: &str,
        filename: &str,
        max_rows: u64,
    ) -> Result<FilePreview, AppError> {
        let path = format!("/conversion/preview/{session_id}/{filename}");
        let response = self
            .execute(|http, token| {
                with_bearer(http.get(self.url(&path)), token).query(&[("max_rows", max_rows)])
            })
            .await?;
        let response = ensure_success(response).await?;
        parse_json(response, "preview").await
    }

    pub async fn download_all(&self, session_id: &str) -> Result<Bytes, AppError> {
        self.download(format!("/conversion/download/{session_id}")).await
    }

    pub async fn download_modified(&self, session_id: &str) -> Result<Bytes, AppError> {
        self.download(format!("/conversion/download-modified/{session_id}"))
            .await
    }

    pub async fn download_file(&self, session_id: &str, filename: &str) -> Result<Bytes, AppError> {
        self.download(format!("/conversion/download-file/{session_id}/{filename}"))
            .await
    }

    pub async fn download_group(&self, session_id: &str, group: &str) -> Result<Bytes, AppError> {
        self.download(format!("/conversion/download-group/{session_id}/{group}"))
            .await
    }

    pub async fn cleanup(&self, session_id: &str) -> Result<(), AppError> {
        let path = format!("/conversion/cleanup/{session_id}");
        let response = self
            .execute(|http, token| with_bearer(http.post(self.url(&path)), token))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn download(&self, path: String) -> Result<Bytes, AppError> {
        let response = self
            .execute(|http, token| with_bearer(http.get(self.url(&path)), token))
            .await?;
        let response = ensure_success(response).await?;
        response
            .bytes()
            .await
            .map_err(|err| AppError::Transport(format!("download failed: {err}")))
    }

    //-- Request gate

    /// Send an authenticated request, refreshing the token once on 401.
    ///
    /// The builder closure is invoked per attempt so request bodies
    /// (multipart forms included) are rebuilt rather than reused.
    async fn execute<F>(&self, build: F) -> Result<Response, AppError>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        // Fail fast when logged out; authenticated calls are never attempted
        // without a token.
        let Some(token) = self.auth.token() else {
            return Err(AuthError::Unauthorized.into());
        };

        let response = build(&self.http, &token)
            .send()
            .await
            .map_err(|err| AppError::Transport(err.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !self.refresh_after_unauthorized(&token).await {
            return Err(AuthError::Unauthorized.into());
        }

        let Some(token) = self.auth.token() else {
            return Err(AuthError::Unauthorized.into());
        };

        let retried = build(&self.http, &token)
            .send()
            .await
            .map_err(|err| AppError::Transport(err.to_string()))?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized.into());
        }

        Ok(retried)
    }

    /// Single-flight refresh. The caller that loses the race re-checks the
    /// token after acquiring the gate and skips its own refresh when another
    /// caller already replaced it.
    async fn refresh_after_unauthorized(&self, stale_token: &str) -> bool {
        let _guard = self.refresh_gate.lock().await;

        match self.auth.token() {
            Some(current) if current != stale_token => true,
            _ => self.refresh().await,
        }
    }
}

fn with_bearer(builder: RequestBuilder, token: &str) -> RequestBuilder {
    builder.bearer_auth(token)
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(AppError::Transport(extract_error_message(response).await))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<T, AppError> {
    response
        .json::<T>()
        .await
        .map_err(|err| AppError::Transport(format!("invalid {what} response: {err}")))
}

/// Pull the backend's `detail` message out of a failure body, falling back
/// to a status-derived message.
async fn extract_error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody { detail: Some(detail) }) if !detail.trim().is_empty() => detail,
        _ => format!("request failed with status {status}"),
    }
}
