//! The conversion workflow stage machine.
//!
//! One `ConversionSession` owns session identity, scan results, conversion
//! results, selection, and preview for exactly one workflow at a time.
//! Operations suspend only at network boundaries; state guards are taken in
//! short scopes and never held across an await.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::common::config::AppConfig;
use crate::common::{AppError, ConversionError, NotificationSink, ValidationError};
use crate::transport::ApiClient;
use crate::workflow::download;
use crate::workflow::stage::Stage;
use crate::workflow::state::{PendingUpload, WorkflowState};

pub struct ConversionSession {
    api: Arc<ApiClient>,
    notices: NotificationSink,
    downloads_dir: PathBuf,
    preview_rows: u64,
    default_format: String,
    state: Arc<RwLock<WorkflowState>>,
}

impl ConversionSession {
    pub fn new(api: Arc<ApiClient>, notices: NotificationSink, config: &AppConfig) -> Self {
        Self {
            api,
            notices,
            downloads_dir: config.downloads.dir.clone(),
            preview_rows: config.workflow.preview_rows,
            default_format: config.workflow.output_format.clone(),
            state: Arc::new(RwLock::new(WorkflowState::new(
                config.workflow.output_format.clone(),
            ))),
        }
    }

    /// Point-in-time copy of the workflow state for rendering and tests.
    pub fn snapshot(&self) -> WorkflowState {
        self.read().clone()
    }

    pub fn has_session(&self) -> bool {
        self.read().has_session()
    }

    pub fn is_scanned(&self) -> bool {
        self.read().is_scanned()
    }

    pub fn is_converted(&self) -> bool {
        self.read().is_converted()
    }

    pub fn stage(&self) -> Stage {
        self.read().stage
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    //-- Local operations (synchronous, no failure mode)

    /// Append files to the pending upload queue. No network effect.
    pub fn add_files(&self, files: Vec<PendingUpload>) {
        self.write().pending_uploads.extend(files);
    }

    pub fn add_file(&self, filename: impl Into<String>, bytes: Vec<u8>) {
        self.write().pending_uploads.push(PendingUpload {
            filename: filename.into(),
            bytes,
        });
    }

    pub fn select_all_groups(&self) {
        self.write().select_all_groups();
    }

    pub fn clear_group_selection(&self) {
        self.write().clear_group_selection();
    }

    pub fn toggle_group(&self, name: &str) {
        self.write().toggle_group(name);
    }

    pub fn set_search(&self, term: impl Into<String>) {
        self.write().search = term.into();
    }

    pub fn set_output_format(&self, format: impl Into<String>) {
        self.write().output_format = format.into();
    }

    pub fn set_edit_mode(&self, enabled: bool) {
        self.write().edit_mode = enabled;
    }

    /// Unconditional teardown of every workflow field to its initial value.
    /// In-flight calls resolving after this point are discarded by epoch.
    pub fn reset(&self) {
        let format = self.default_format.clone();
        self.write().reset_to_initial(format);
        tracing::debug!("Workflow reset");
    }

    //-- Stage transitions

    /// Upload the first queued file and populate scan results.
    pub async fn scan(&self) -> Result<(), AppError> {
        let (epoch, upload) = {
            let mut state = self.write();
            if state.stage.is_in_flight() {
                return Err(ValidationError::OperationInFlight.into());
            }
            let Some(upload) = state.pending_uploads.first().cloned() else {
                return Err(ValidationError::NoFiles.into());
            };
            state.stage = Stage::Scanning;
            state.error = None;
            (state.epoch, upload)
        };

        let result = self.api.scan(&upload.filename, upload.bytes).await;

        let mut state = self.write();
        if state.epoch != epoch {
            tracing::debug!("Discarding scan result from a reset workflow");
            return Ok(());
        }

        match result {
            Ok(scan) => {
                state.stage = Stage::Scanned;
                state.summary = Some(scan.summary_or_default());
                state.session_id = Some(scan.session_id);
                state.groups = scan.groups;
                state.prune_selection();
                // A fresh scan starts a fresh workflow; conversion artifacts
                // from any prior session are gone server-side too.
                state.converted = false;
                state.files.clear();
                state.total_files = 0;
                state.active_group = None;
                state.active_file = None;
                state.preview = None;
                tracing::info!(
                    session_id = state.session_id.as_deref().unwrap_or_default(),
                    groups = state.groups.len(),
                    "Archive scanned"
                );
                Ok(())
            }
            Err(err) => {
                state.stage = Stage::Idle;
                state.error = Some(err.display_message());
                self.notices.error(err.display_message());
                Err(err)
            }
        }
    }

    /// Submit the scanned groups for conversion, then load the results.
    pub async fn convert(&self) -> Result<(), AppError> {
        let (epoch, session_id, format, group_names) = {
            let mut state = self.write();
            if state.stage.is_in_flight() {
                return Err(ValidationError::OperationInFlight.into());
            }
            let Some(session_id) = state.session_id.clone() else {
                return Err(ValidationError::NoSession.into());
            };
            let names: Vec<String> = state.groups.iter().map(|g| g.name.clone()).collect();
            state.stage = Stage::Converting;
            state.error = None;
            (state.epoch, session_id, state.output_format.clone(), names)
        };

        let result = self.api.convert(&session_id, &format, &group_names).await;

        {
            let mut state = self.write();
            if state.epoch != epoch {
                tracing::debug!("Discarding convert result from a reset workflow");
                return Ok(());
            }

            match result {
                Ok(response) if response.success => {
                    state.stage = Stage::Converted;
                    state.converted = true;
                    tracing::info!(%session_id, "Conversion succeeded");
                }
                Ok(_) => {
                    state.stage = Stage::Scanned;
                    let err = AppError::from(ConversionError::Failed);
                    state.error = Some(err.display_message());
                    self.notices.error(err.display_message());
                    return Err(err);
                }
                Err(err) => {
                    state.stage = Stage::Scanned;
                    state.error = Some(err.display_message());
                    self.notices.error(err.display_message());
                    return Err(err);
                }
            }
        }

        // Loading results is best-effort; the error path logs inside.
        self.load_converted_files().await;
        Ok(())
    }

    /// Fetch the group/file listing and cascade into the first group.
    /// Best-effort: failures are logged, the last loaded listing stands.
    pub async fn load_converted_files(&self) {
        let (epoch, session_id) = {
            let state = self.read();
            let Some(session_id) = state.session_id.clone() else {
                return;
            };
            (state.epoch, session_id)
        };

        let listing = match self.api.list_files(&session_id).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!("Failed to load converted files: {err}");
                return;
            }
        };

        let has_groups = {
            let mut state = self.write();
            if state.epoch != epoch {
                tracing::debug!("Discarding file listing from a reset workflow");
                return;
            }
            state.files = listing.files;
            state.total_files = listing.total_files;
            state.groups = listing.groups;
            state.prune_selection();
            state.active_group = state.groups.first().map(|g| g.name.clone());
            state.active_group.is_some()
        };

        if has_groups {
            self.load_group_files().await;
        }
    }

    /// Narrow the loaded file list to the active group (purely local) and
    /// cascade into the first file's preview.
    pub async fn load_group_files(&self) {
        let first_file = {
            let mut state = self.write();
            let Some(active) = state.active_group.clone() else {
                return;
            };
            let first = state
                .files
                .iter()
                .find(|f| f.group == active)
                .map(|f| f.filename.clone());
            match &first {
                Some(filename) => state.active_file = Some(filename.clone()),
                None => {
                    // Empty group: nothing to preview, and nothing stale
                    // may remain visible under the old file's label.
                    state.active_file = None;
                    state.preview = None;
                }
            }
            first
        };

        if first_file.is_some() {
            self.load_file_preview().await;
        }
    }

    /// Fetch the row-capped preview for the active file. A failed load
    /// clears the preview; a resolution for a file that is no longer
    /// active is discarded.
    pub async fn load_file_preview(&self) {
        let (epoch, session_id, filename) = {
            let mut state = self.write();
            let (Some(session_id), Some(filename)) =
                (state.session_id.clone(), state.active_file.clone())
            else {
                return;
            };
            state.preview = None;
            (state.epoch, session_id, filename)
        };

        match self.api.preview(&session_id, &filename, self.preview_rows).await {
            Ok(preview) => {
                let mut state = self.write();
                if state.epoch != epoch || state.active_file.as_deref() != Some(filename.as_str())
                {
                    tracing::debug!(%filename, "Discarding preview for inactive file");
                    return;
                }
                state.preview = Some(preview);
            }
            Err(err) => {
                tracing::warn!(%filename, "Failed to load preview: {err}");
            }
        }
    }

    /// Make a loaded group active and load its files.
    pub async fn select_group(&self, name: &str) {
        {
            let mut state = self.write();
            if !state.groups.iter().any(|g| g.name == name) {
                tracing::warn!(group = name, "Ignoring selection of unknown group");
                return;
            }
            state.active_group = Some(name.to_string());
        }
        self.load_group_files().await;
    }

    /// Make a loaded file active and load its preview.
    pub async fn select_file(&self, name: &str) {
        {
            let mut state = self.write();
            if !state.files.iter().any(|f| f.filename == name) {
                tracing::warn!(file = name, "Ignoring selection of unknown file");
                return;
            }
            state.active_file = Some(name.to_string());
        }
        self.load_file_preview().await;
    }

    //-- Downloads

    /// Download the full converted archive. No-op without a session.
    pub async fn download_all(&self) -> Result<Option<PathBuf>, AppError> {
        let Some(session_id) = self.read().session_id.clone() else {
            return Ok(None);
        };
        let bytes = self.api.download_all(&session_id).await?;
        let path =
            download::save_bytes(&self.downloads_dir, download::ALL_ARCHIVE_NAME, bytes).await?;
        Ok(Some(path))
    }

    /// Download the edited archive. No-op without a session or edit mode.
    pub async fn download_modified(&self) -> Result<Option<PathBuf>, AppError> {
        let session_id = {
            let state = self.read();
            if !state.edit_mode {
                return Ok(None);
            }
            match state.session_id.clone() {
                Some(session_id) => session_id,
                None => return Ok(None),
            }
        };
        let bytes = self.api.download_modified(&session_id).await?;
        let path =
            download::save_bytes(&self.downloads_dir, download::MODIFIED_ARCHIVE_NAME, bytes)
                .await?;
        Ok(Some(path))
    }

    /// Download a single converted file under its literal filename.
    pub async fn download_file(&self, filename: &str) -> Result<Option<PathBuf>, AppError> {
        let Some(session_id) = self.read().session_id.clone() else {
            return Ok(None);
        };
        let bytes = self.api.download_file(&session_id, filename).await?;
        let path = download::save_bytes(&self.downloads_dir, filename, bytes).await?;
        Ok(Some(path))
    }

    /// Download one group's archive as `{group}_group.zip`.
    pub async fn download_group(&self, group: &str) -> Result<Option<PathBuf>, AppError> {
        let Some(session_id) = self.read().session_id.clone() else {
            return Ok(None);
        };
        let bytes = self.api.download_group(&session_id, group).await?;
        let path =
            download::save_bytes(&self.downloads_dir, &download::group_archive_name(group), bytes)
                .await?;
        Ok(Some(path))
    }

    //-- Teardown

    /// Request upstream teardown of session-scoped resources, then reset.
    ///
    /// Unlike logout, an upstream failure propagates and local state is
    /// retained so the caller can retry the teardown.
    pub async fn cleanup(&self) -> Result<(), AppError> {
        let (epoch, session_id, prior_stage) = {
            let mut state = self.write();
            let Some(session_id) = state.session_id.clone() else {
                return Ok(());
            };
            if state.stage.is_in_flight() {
                return Err(ValidationError::OperationInFlight.into());
            }
            let prior = state.stage;
            state.stage = Stage::Cleaning;
            (state.epoch, session_id, prior)
        };

        match self.api.cleanup(&session_id).await {
            Ok(()) => {
                let mut state = self.write();
                if state.epoch != epoch {
                    return Ok(());
                }
                let format = self.default_format.clone();
                state.reset_to_initial(format);
                tracing::info!(%session_id, "Session cleaned up");
                Ok(())
            }
            Err(err) => {
                let mut state = self.write();
                if state.epoch == epoch {
                    state.stage = prior_stage;
                    state.error = Some(err.display_message());
                }
                self.notices.error(err.display_message());
                Err(err)
            }
        }
    }

    //-- Lock helpers

    fn read(&self) -> std::sync::RwLockReadGuard<'_, WorkflowState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Workflow state lock poisoned during read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, WorkflowState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Workflow state lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// Shared state; clones drive the same workflow.
impl Clone for ConversionSession {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            notices: self.notices.clone(),
            downloads_dir: self.downloads_dir.clone(),
            preview_rows: self.preview_rows,
            default_format: self.default_format.clone(),
            state: self.state.clone(),
        }
    }
}
