#![allow(dead_code)]

pub mod backend;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use archconv::auth::{AuthStore, TokenLifecycle};
use archconv::common::config::AppConfig;
use archconv::common::NotificationSink;
use archconv::transport::ApiClient;
use archconv::workflow::ConversionSession;

use backend::BackendState;

/// A client stack wired to a freshly spawned mock backend.
pub struct TestHarness {
    pub backend: Arc<BackendState>,
    pub api: Arc<ApiClient>,
    pub auth: TokenLifecycle,
    pub session: ConversionSession,
    pub notices: NotificationSink,
    pub downloads: TempDir,
}

pub async fn harness() -> TestHarness {
    let (backend, base_url) = backend::spawn_backend().await;
    let downloads = TempDir::new().expect("downloads tempdir");

    let mut config = AppConfig::default();
    config.api.base_url = base_url;
    config.downloads.dir = downloads.path().to_path_buf();

    let notices = NotificationSink::new(Duration::from_secs(30));
    let api = Arc::new(
        ApiClient::new(&config.api, AuthStore::new(), notices.clone())
            .expect("client should build"),
    );
    let auth = TokenLifecycle::new(api.clone());
    let session = ConversionSession::new(api.clone(), notices.clone(), &config);

    TestHarness {
        backend,
        api,
        auth,
        session,
        notices,
        downloads,
    }
}

pub async fn login(harness: &TestHarness) {
    harness
        .auth
        .login("tester", backend::PASSWORD)
        .await
        .expect("login should succeed");
}

pub fn queue_archive(harness: &TestHarness) {
    harness.session.add_file("input.zip", b"PK\x03\x04fake".to_vec());
}

/// Login, queue an archive, and run a successful scan.
pub async fn scanned_harness() -> TestHarness {
    let harness = harness().await;
    login(&harness).await;
    queue_archive(&harness);
    harness.session.scan().await.expect("scan should succeed");
    harness
}
