//! End-of-run summary

use crate::error::Result;
use crate::scheduler::{DownloadOutcome, OutcomeStatus};
use crate::tree::RemoteId;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A folder whose contents were never listed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FolderSkip {
    /// Remote id of the folder
    pub folder_id: RemoteId,
    /// Where the folder would live locally
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// Counts and per-item details of one export run
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    /// Documents written to disk
    pub succeeded: usize,
    /// Documents that failed
    pub failed: usize,
    /// Documents deliberately not downloaded
    pub skipped: usize,
    /// Bytes written across all documents
    pub total_bytes: u64,
    /// Folders whose sub-trees were abandoned
    pub folders_skipped: usize,
    /// One outcome per document, in traversal order
    pub outcomes: Vec<DownloadOutcome>,
    /// Abandoned folders, in the order they were skipped
    pub skipped_folders: Vec<FolderSkip>,
}

impl RunReport {
    /// Reduce outcomes and skipped folders to a report
    pub fn summarize(outcomes: Vec<DownloadOutcome>, skipped_folders: Vec<FolderSkip>) -> Self {
        let mut report = Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            total_bytes: 0,
            folders_skipped: skipped_folders.len(),
            outcomes: Vec::new(),
            skipped_folders,
        };
        for outcome in &outcomes {
            match outcome.status {
                OutcomeStatus::Succeeded => report.succeeded += 1,
                OutcomeStatus::Failed(_) => report.failed += 1,
                OutcomeStatus::Skipped(_) => report.skipped += 1,
            }
            report.total_bytes += outcome.bytes_written;
        }
        report.outcomes = outcomes;
        report
    }

    /// Failed and skipped documents, in traversal order
    pub fn issues(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::Succeeded)
    }

    /// Failed documents, in traversal order
    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed(_)))
    }

    /// True if anything was missed: a failure, a cancelled document or a
    /// skipped folder
    pub fn is_partial(&self) -> bool {
        self.failed > 0
            || self.folders_skipped > 0
            || self
                .outcomes
                .iter()
                .any(|o| matches!(&o.status, OutcomeStatus::Skipped(r) if r == "cancelled"))
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} downloaded, {} failed, {} skipped ({} bytes)",
            self.succeeded, self.failed, self.skipped, self.total_bytes
        )?;
        if self.folders_skipped > 0 {
            writeln!(f, "{} folder(s) could not be listed:", self.folders_skipped)?;
            for folder in &self.skipped_folders {
                writeln!(f, "  {}: {}", folder.path.display(), folder.reason)?;
            }
        }
        for outcome in self.issues() {
            let (label, reason) = match &outcome.status {
                OutcomeStatus::Failed(reason) => ("FAILED", reason),
                OutcomeStatus::Skipped(reason) => ("SKIPPED", reason),
                OutcomeStatus::Succeeded => continue,
            };
            writeln!(f, "  {label} {}: {reason}", outcome.path.display())?;
        }
        Ok(())
    }
}
