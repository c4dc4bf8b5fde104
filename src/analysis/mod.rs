//! Background analysis jobs and snapshot serving.
//!
//! Analyzing a large capture takes seconds, so the analyze endpoint
//! creates a job and returns immediately; a worker computes the full
//! analysis off the async runtime and stores it as a snapshot. The
//! synchronous section endpoints reuse the latest snapshot when one
//! exists and only fall back to computing on the spot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::data::{AnalysisJob, AnalysisJobStatus, AnalysisStore};
use crate::trace::{analyze_file, trace_details, FullAnalysis, TraceDetails};

/// Runs analysis jobs and serves their results
#[derive(Clone)]
pub struct AnalysisManager {
    store: Option<AnalysisStore>,
    jobs: Arc<Mutex<HashMap<Uuid, AnalysisJob>>>,
}

impl AnalysisManager {
    /// Create a manager, persisting jobs and snapshots when a store is
    /// available
    pub fn new(store: Option<AnalysisStore>) -> Self {
        Self {
            store,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a pending job for the trace and hand it to a worker.
    /// Returns as soon as the job record exists.
    pub fn start_analysis(&self, file_id: Uuid, path: PathBuf) -> AnalysisJob {
        let job = AnalysisJob::new(file_id);
        self.jobs.lock().insert(job.job_id, job.clone());
        self.persist_job(&job);

        let manager = self.clone();
        let job_id = job.job_id;
        tokio::spawn(async move {
            manager.run_job(job_id, file_id, path).await;
        });
        job
    }

    /// Current record for one job
    pub fn get_job(&self, job_id: Uuid) -> Option<AnalysisJob> {
        if let Some(job) = self.jobs.lock().get(&job_id) {
            return Some(job.clone());
        }

        let store = self.store.as_ref()?;
        match store.get_job(job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!("Failed to read analysis job {}: {}", job_id, e);
                None
            }
        }
    }

    /// Full analysis for a trace: the latest stored snapshot when one
    /// exists, computed on the spot otherwise
    pub async fn full_analysis(
        &self,
        file_id: Uuid,
        path: &Path,
    ) -> anyhow::Result<FullAnalysis> {
        if let Some(analysis) = self.snapshot(file_id) {
            return Ok(analysis);
        }

        let owned = path.to_path_buf();
        let analysis = tokio::task::spawn_blocking(move || analyze_file(&owned)).await??;
        self.save_snapshot(file_id, &analysis);
        Ok(analysis)
    }

    /// Lightweight summary view of a capture
    pub async fn details(&self, path: &Path) -> anyhow::Result<TraceDetails> {
        let owned = path.to_path_buf();
        Ok(tokio::task::spawn_blocking(move || trace_details(&owned)).await??)
    }

    /// Drop all analysis state for a deleted trace
    pub fn forget_file(&self, file_id: Uuid) {
        self.jobs.lock().retain(|_, job| job.file_id != file_id);
        if let Some(store) = &self.store {
            if let Err(e) = store.delete_for_file(file_id) {
                warn!("Failed to drop analysis rows for {}: {}", file_id, e);
            }
        }
    }

    async fn run_job(&self, job_id: Uuid, file_id: Uuid, path: PathBuf) {
        self.transition(job_id, AnalysisJobStatus::Analyzing, None);

        match tokio::task::spawn_blocking(move || analyze_file(&path)).await {
            Ok(Ok(analysis)) => {
                self.save_snapshot(file_id, &analysis);
                self.transition(job_id, AnalysisJobStatus::Completed, None);
            }
            Ok(Err(e)) => {
                warn!("Analysis job {} failed: {}", job_id, e);
                self.transition(job_id, AnalysisJobStatus::Failed, Some(e.to_string()));
            }
            Err(e) => {
                error!("Analysis job {} crashed: {}", job_id, e);
                self.transition(
                    job_id,
                    AnalysisJobStatus::Failed,
                    Some("analysis worker crashed".to_string()),
                );
            }
        }
    }

    fn transition(&self, job_id: Uuid, status: AnalysisJobStatus, error: Option<String>) {
        let updated = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(&job_id) else {
                return;
            };
            job.status = status;
            job.error = error;
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist_job(&updated);
    }

    fn persist_job(&self, job: &AnalysisJob) {
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_job(job) {
                warn!("Failed to persist analysis job {}: {}", job.job_id, e);
            }
        }
    }

    fn snapshot(&self, file_id: Uuid) -> Option<FullAnalysis> {
        let store = self.store.as_ref()?;
        let payload = match store.latest_snapshot(file_id) {
            Ok(payload) => payload?,
            Err(e) => {
                warn!("Failed to read analysis snapshot for {}: {}", file_id, e);
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("Corrupt analysis snapshot for {}: {}", file_id, e);
                None
            }
        }
    }

    fn save_snapshot(&self, file_id: Uuid, analysis: &FullAnalysis) {
        let Some(store) = &self.store else {
            return;
        };
        let payload = match serde_json::to_string(analysis) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize analysis for {}: {}", file_id, e);
                return;
            }
        };
        if let Err(e) = store.save_snapshot(file_id, &payload) {
            warn!("Failed to store analysis snapshot for {}: {}", file_id, e);
        }
    }
}
