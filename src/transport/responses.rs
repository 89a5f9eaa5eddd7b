//! Wire shapes consumed from the conversion backend.
//!
//! Optional fields the backend may omit are defaulted at the serde layer so
//! downstream code never handles partial records.

use serde::Deserialize;

use crate::auth::User;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// A named partition of the uploaded archive, with aggregate counts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub size: u64,
}

/// One converted output file, always attributable to a loaded group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConvertedFile {
    pub filename: String,
    pub group: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScanSummary {
    #[serde(default)]
    pub total_groups: u64,
    #[serde(default)]
    pub total_files: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanResponse {
    pub session_id: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub summary: Option<ScanSummary>,
    #[serde(default)]
    pub xml_count: u64,
}

impl ScanResponse {
    /// Summary with totals defaulted to the group count and the
    /// server-reported file count when the backend sent none.
    pub fn summary_or_default(&self) -> ScanSummary {
        self.summary.unwrap_or(ScanSummary {
            total_groups: self.groups.len() as u64,
            total_files: self.xml_count,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub files: Vec<ConvertedFile>,
    #[serde(default)]
    pub total_files: u64,
}

/// Row-capped preview of one converted file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilePreview {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub total_rows: u64,
}

/// Error body shape used by the backend for failure details.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<String>,
}
