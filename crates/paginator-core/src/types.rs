// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Paginator pipeline and job agent.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordinal of the cover page. The cover bypasses all compositing.
pub const COVER_ORDINAL: u32 = 1;

/// Unique identifier for a document job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a document job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Pages are being composited or the PDF is being written.
    Processing,
    /// The PDF was written successfully.
    Completed,
    /// The job aborted; see the job's error field.
    Failed,
    /// A client asked the job to stop; no document was produced.
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Progress notification emitted after each composited page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based index of the page just finished.
    pub current: usize,
    /// Number of pages in the job.
    pub total: usize,
    /// Ordinal of the page just finished.
    pub page: u32,
}

/// The fixed assets every non-cover page needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetRole {
    Template,
    TitleFont,
    PageNumberFont,
}

impl std::fmt::Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Template => "header/footer template",
            Self::TitleFont => "title font",
            Self::PageNumberFont => "page number font",
        };
        f.write_str(label)
    }
}

/// A numbered page waiting to be composited.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    /// Sequencing integer parsed from the file name's leading digits.
    pub ordinal: u32,
    /// Raw encoded image bytes, exactly as received.
    pub source: Vec<u8>,
    /// Where the page came from (relative path or upload name), for diagnostics.
    pub origin: String,
}

/// A page after compositing: a fully opaque PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositedPage {
    pub ordinal: u32,
    pub width: u32,
    pub height: u32,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
}

/// The finished PDF, as written to disk.
#[derive(Debug, Clone)]
pub struct DocumentOutput {
    /// Final destination path.
    pub path: PathBuf,
    /// The same bytes that were written to `path`.
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// SHA-256 of `bytes`, lowercase hex.
    pub sha256: String,
}

/// Point-in-time view of a job, as reported to remote clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub title: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of the embedded job agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_display_roundtrips_through_parse() {
        let id = JobId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(JobId::parse(&text), Some(id));
    }

    #[test]
    fn job_id_parse_rejects_garbage() {
        assert_eq!(JobId::parse("not-a-job"), None);
    }

    #[test]
    fn job_status_serialises_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).expect("serialise");
        assert_eq!(json, "\"processing\"");
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn snapshot_uses_camel_case_and_skips_empty_fields() {
        let now = Utc::now();
        let snapshot = JobSnapshot {
            job_id: JobId::new(),
            title: "SAMPLE".into(),
            status: JobStatus::Processing,
            progress: Some(Progress {
                current: 1,
                total: 3,
                page: 1,
            }),
            saved_path: None,
            sha256: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&snapshot).expect("serialise");
        assert!(value.get("jobId").is_some());
        assert!(value.get("savedPath").is_none());
        assert_eq!(value["progress"]["total"], 3);
    }
}
