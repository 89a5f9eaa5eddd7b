//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MAX_PREVIEW_ROWS: u64 = 1000;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "archconv")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("archconv.toml"))
}

/// Connection settings for the conversion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the conversion service, no trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Directory converted archives and files are saved into.
    pub dir: PathBuf,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Row cap requested for file previews.
    pub preview_rows: u64,
    /// Output format submitted with convert requests. Opaque to the client.
    pub output_format: String,
    /// Seconds a notice stays visible before expiry.
    pub notice_ttl_secs: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            preview_rows: 100,
            output_format: "csv".to_string(),
            notice_ttl_secs: 8,
        }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub downloads: DownloadSettings,
    pub workflow: WorkflowSettings,
}

impl AppConfig {
    /// Validates connection and workflow bounds, rejecting unusable values.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.api.base_url.trim().is_empty(),
            "Invalid config: api.base_url must not be empty"
        );
        ensure!(
            reqwest::Url::parse(&self.api.base_url).is_ok(),
            "Invalid config: api.base_url is not a valid URL"
        );
        ensure!(
            self.api.timeout_secs >= 1,
            "Invalid config: api.timeout_secs must be >= 1"
        );
        ensure!(
            self.api.timeout_secs <= MAX_REQUEST_TIMEOUT_SECS,
            "Invalid config: api.timeout_secs must be <= {MAX_REQUEST_TIMEOUT_SECS}"
        );
        ensure!(
            self.workflow.preview_rows >= 1,
            "Invalid config: workflow.preview_rows must be >= 1"
        );
        ensure!(
            self.workflow.preview_rows <= MAX_PREVIEW_ROWS,
            "Invalid config: workflow.preview_rows must be <= {MAX_PREVIEW_ROWS}"
        );
        ensure!(
            !self.workflow.output_format.trim().is_empty(),
            "Invalid config: workflow.output_format must not be empty"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &std::path::Path) -> Result<AppConfig> {
    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ARCHCONV_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(base_url) = &overrides.base_url {
        config.api.base_url = base_url.clone();
    }
    if let Some(dir) = &overrides.output_dir {
        config.downloads.dir = dir.clone();
    }
    if let Some(format) = &overrides.output_format {
        config.workflow.output_format = format.clone();
    }

    config
}
