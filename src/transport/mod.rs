pub mod client;
pub mod responses;

pub use client::ApiClient;
pub use responses::{
    ConvertResponse, ConvertedFile, FileListResponse, FilePreview, Group, ScanResponse,
    ScanSummary,
};
