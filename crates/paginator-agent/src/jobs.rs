// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-job state owned by the agent.
//
// Each submitted job gets its own `JobContext`; the registry only maps IDs to
// contexts. The pipeline never sees the registry, it reports through the
// context's progress observer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use paginator_core::error::PaginatorError;
use paginator_core::types::{DocumentOutput, JobId, JobSnapshot, JobStatus, Progress};
use paginator_document::{CancellationToken, ProgressObserver};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// How long a finished job stays queryable by default.
const DEFAULT_RETENTION_MINUTES: i64 = 60;

use crate::protocol::error_text;

/// Mutable part of a job, guarded by the context's mutex.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: Option<Progress>,
    saved_path: Option<std::path::PathBuf>,
    sha256: Option<String>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Everything the agent knows about one job.
#[derive(Debug)]
pub struct JobContext {
    id: JobId,
    title: String,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    state: Mutex<JobState>,
}

impl JobContext {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            title: title.into(),
            created_at: now,
            cancel: CancellationToken::new(),
            state: Mutex::new(JobState {
                status: JobStatus::Processing,
                progress: None,
                saved_path: None,
                sha256: None,
                error: None,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state();
        JobSnapshot {
            job_id: self.id,
            title: self.title.clone(),
            status: state.status,
            progress: state.progress,
            saved_path: state.saved_path.clone(),
            sha256: state.sha256.clone(),
            error: state.error.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }

    pub fn record_progress(&self, progress: Progress) {
        let mut state = self.state();
        state.progress = Some(progress);
        state.updated_at = Utc::now();
    }

    pub fn complete(&self, output: &DocumentOutput) {
        let mut state = self.state();
        state.status = JobStatus::Completed;
        state.saved_path = Some(output.path.clone());
        state.sha256 = Some(output.sha256.clone());
        state.updated_at = Utc::now();
        info!(job = %self.id, path = %output.path.display(), "Job completed");
    }

    pub fn fail(&self, err: &PaginatorError) {
        let mut state = self.state();
        state.status = match err {
            PaginatorError::Cancelled => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        };
        state.error = Some(error_text(err));
        state.updated_at = Utc::now();
        info!(job = %self.id, status = ?state.status, error = %err, "Job ended without a document");
    }

    /// Finished, and last touched at or before `cutoff`.
    fn expired(&self, cutoff: DateTime<Utc>) -> bool {
        let state = self.state();
        state.status.is_terminal() && state.updated_at <= cutoff
    }

    /// Ask a running job to stop before its next page.
    ///
    /// Returns `false` when the job had already finished.
    pub fn request_cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        debug!(job = %self.id, "Cancellation requested");
        true
    }
}

/// Progress observer for one agent job: updates the job's context and, for
/// WebSocket jobs, forwards each notification to the connection task.
pub struct JobProgress {
    context: Arc<JobContext>,
    forward: Option<UnboundedSender<Progress>>,
}

impl JobProgress {
    pub fn new(context: Arc<JobContext>, forward: Option<UnboundedSender<Progress>>) -> Self {
        Self { context, forward }
    }
}

impl ProgressObserver for JobProgress {
    fn on_page(&mut self, progress: Progress) {
        self.context.record_progress(progress);
        if let Some(forward) = &self.forward {
            // The receiver is gone when the client disconnected; the job
            // still runs to completion.
            let _ = forward.send(progress);
        }
    }
}

/// The jobs one agent instance has accepted.
///
/// Finished jobs are dropped once they are older than the retention window;
/// running jobs are never dropped.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobContext>>>,
    retention: TimeDelta,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(TimeDelta::minutes(DEFAULT_RETENTION_MINUTES))
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: TimeDelta) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobContext>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new job in the `Processing` state, pruning expired ones.
    pub fn create(&self, title: &str) -> Arc<JobContext> {
        self.prune();
        let context = Arc::new(JobContext::new(title));
        self.jobs().insert(context.id(), Arc::clone(&context));
        context
    }

    /// Drop finished jobs older than the retention window. Returns how many
    /// were removed.
    pub fn prune(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, remaining = jobs.len(), "Pruned finished jobs");
        }
        removed
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobContext>> {
        self.jobs().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }
}
