//! Mutable state for one conversion workflow.

use std::collections::BTreeSet;

use crate::transport::{ConvertedFile, FilePreview, Group, ScanSummary};
use crate::workflow::stage::Stage;

/// A file queued for upload. Bytes are held in memory until scanned.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// All fields owned by exactly one workflow. `reset_to_initial` is the sole
/// destructor, returning every field to its empty/absent initial value.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub stage: Stage,
    /// Opaque server-issued handle; absence means no workflow is active.
    pub session_id: Option<String>,
    pub pending_uploads: Vec<PendingUpload>,
    pub groups: Vec<Group>,
    pub summary: Option<ScanSummary>,
    pub converted: bool,
    pub files: Vec<ConvertedFile>,
    pub total_files: u64,
    pub active_group: Option<String>,
    pub active_file: Option<String>,
    /// Preview of the active file only; replaced wholesale, never merged.
    pub preview: Option<FilePreview>,
    pub selected_groups: BTreeSet<String>,
    pub search: String,
    pub output_format: String,
    pub edit_mode: bool,
    pub error: Option<String>,
    /// Bumped on every reset; async resolutions carrying a stale epoch are
    /// discarded instead of mutating the successor workflow.
    pub epoch: u64,
}

impl WorkflowState {
    pub fn new(output_format: String) -> Self {
        Self {
            output_format,
            ..Self::default()
        }
    }

    /// Hard reset preserving only the epoch progression.
    pub fn reset_to_initial(&mut self, output_format: String) {
        let epoch = self.epoch + 1;
        *self = Self::new(output_format);
        self.epoch = epoch;
    }

    //-- Derived state (computed, never stored)

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn is_scanned(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn is_converted(&self) -> bool {
        self.converted && !self.files.is_empty()
    }

    /// Case-insensitive substring match against group names; the full list
    /// when the search term is empty.
    pub fn filtered_groups(&self) -> Vec<Group> {
        let term = self.search.trim().to_lowercase();
        if term.is_empty() {
            return self.groups.clone();
        }
        self.groups
            .iter()
            .filter(|g| g.name.to_lowercase().contains(&term))
            .cloned()
            .collect()
    }

    pub fn files_in_group(&self, group: &str) -> Vec<ConvertedFile> {
        self.files
            .iter()
            .filter(|f| f.group == group)
            .cloned()
            .collect()
    }

    //-- Selection set

    pub fn select_all_groups(&mut self) {
        self.selected_groups = self.groups.iter().map(|g| g.name.clone()).collect();
    }

    pub fn clear_group_selection(&mut self) {
        self.selected_groups.clear();
    }

    /// Toggle one group in or out of the selection. Unknown names are
    /// ignored; the selection stays a subset of the loaded groups.
    pub fn toggle_group(&mut self, name: &str) {
        if self.selected_groups.remove(name) {
            return;
        }
        if self.groups.iter().any(|g| g.name == name) {
            self.selected_groups.insert(name.to_string());
        }
    }

    /// Intersect the selection down to the currently loaded groups.
    /// Called whenever groups are reloaded.
    pub fn prune_selection(&mut self) {
        let names: BTreeSet<&str> = self.groups.iter().map(|g| g.name.as_str()).collect();
        self.selected_groups.retain(|n| names.contains(n.as_str()));
    }
}
