//! Background job tracking and workers
//!
//! An explicit job-store object (constructed once, shared via `Arc`) plus a
//! bounded worker pool. Submission returns a job id immediately; the owning
//! background task is the only writer of that id's snapshot, and every write
//! replaces the snapshot wholesale, so polling reads are never torn.
//!
//! Nothing here persists: the registry's content is lost on restart by
//! design, and no entry is deleted during the process lifetime.

pub mod relocate;
pub mod transcode;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::info;

/// What a job does; ids are scoped per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Relocate,
    Proxy,
    AudioExtract,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Relocate => "relocate",
            JobKind::Proxy => "proxy",
            JobKind::AudioExtract => "audio_extract",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    DoneWithErrors,
    /// Sentinel returned for reads of ids the store has never seen
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::DoneWithErrors)
    }
}

/// Per-item progress counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobProgress {
    /// Item currently being processed
    pub current: Option<String>,
    /// Percent for the current item, as reported by the copy tool
    pub percent: Option<u8>,
    /// Items processed so far (moved or failed)
    pub completed: usize,
    /// Items submitted with the job
    pub total: usize,
    pub bytes_moved: u64,
    pub total_bytes: u64,
}

/// One asynchronous operation's full observable state
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub kind: Option<JobKind>,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// Accumulated per-item failure messages
    pub errors: Vec<String>,
    /// Accumulated per-item output paths
    pub outputs: Vec<String>,
}

impl JobSnapshot {
    fn new(id: String, kind: JobKind) -> Self {
        Self {
            id,
            kind: Some(kind),
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            errors: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Sentinel for reads of ids the store does not know
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: None,
            status: JobStatus::Unknown,
            progress: JobProgress::default(),
            errors: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// Process-lifetime registry of job snapshots
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobSnapshot>>,
    counters: Mutex<HashMap<JobKind, u64>>,
}

impl JobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        })
    }

    /// Register a new queued job and return its id. Counters increase
    /// monotonically per kind and restart with the process.
    pub fn create(&self, kind: JobKind) -> String {
        let n = {
            let mut counters = self.counters.lock();
            let n = counters.entry(kind).or_insert(0);
            *n += 1;
            *n
        };
        let id = format!("{}:{}", kind.as_str(), n);
        self.jobs
            .write()
            .insert(id.clone(), JobSnapshot::new(id.clone(), kind));
        id
    }

    /// Replace the stored snapshot wholesale
    pub fn update(&self, snapshot: JobSnapshot) {
        self.jobs.write().insert(snapshot.id.clone(), snapshot);
    }

    /// Read a snapshot; unknown ids return the `Unknown` sentinel instead
    /// of failing
    pub fn get(&self, id: &str) -> JobSnapshot {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| JobSnapshot::unknown(id))
    }
}

/// Write handle owned by exactly one background task
pub struct JobHandle {
    store: Arc<JobStore>,
    snapshot: JobSnapshot,
}

impl JobHandle {
    fn new(store: Arc<JobStore>, id: &str) -> Self {
        let snapshot = store.get(id);
        Self { store, snapshot }
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }

    /// Mutate the snapshot and publish the whole updated value
    pub fn update<F: FnOnce(&mut JobSnapshot)>(&mut self, f: F) {
        f(&mut self.snapshot);
        self.store.update(self.snapshot.clone());
    }

    pub fn record_error(&mut self, message: String) {
        self.update(|s| s.errors.push(message));
    }

    pub fn record_output(&mut self, path: String) {
        self.update(|s| s.outputs.push(path));
    }

    /// Drive the snapshot to its terminal status. Called exactly once by
    /// the runner after the task body finishes.
    fn finalize(mut self) {
        if self.snapshot.status.is_terminal() {
            return;
        }
        let status = if self.snapshot.errors.is_empty() {
            JobStatus::Done
        } else {
            JobStatus::DoneWithErrors
        };
        self.update(|s| {
            s.status = status;
            s.progress.current = None;
            s.progress.percent = None;
        });
        info!(job = %self.snapshot.id, status = ?status, "Job finished");
    }
}

/// Fixed-size worker pool driving background jobs
pub struct JobRunner {
    store: Arc<JobStore>,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(store: Arc<JobStore>, workers: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn store(&self) -> Arc<JobStore> {
        self.store.clone()
    }

    /// Queue a job and return its id without waiting for completion. The
    /// task body receives the write handle and must hand it back so the
    /// runner can drive the snapshot terminal exactly once.
    pub fn submit<F, Fut>(&self, kind: JobKind, task: F) -> String
    where
        F: FnOnce(JobHandle) -> Fut + Send + 'static,
        Fut: Future<Output = JobHandle> + Send + 'static,
    {
        let id = self.store.create(kind);
        let store = self.store.clone();
        let permits = self.permits.clone();
        let job_id = id.clone();

        tokio::spawn(async move {
            // The semaphore lives as long as the runner's tasks; acquire
            // only fails if it were closed, which never happens here.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let mut handle = JobHandle::new(store, &job_id);
            handle.update(|s| s.status = JobStatus::Running);
            info!(job = %job_id, "Job started");

            let handle = task(handle).await;
            handle.finalize();
        });

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ids_are_per_kind_counters() {
        let store = JobStore::new();
        assert_eq!(store.create(JobKind::Relocate), "relocate:1");
        assert_eq!(store.create(JobKind::Proxy), "proxy:1");
        assert_eq!(store.create(JobKind::Relocate), "relocate:2");
        assert_eq!(store.create(JobKind::AudioExtract), "audio_extract:1");
    }

    #[test]
    fn test_unknown_id_returns_sentinel() {
        let store = JobStore::new();
        let snapshot = store.get("relocate:999");
        assert_eq!(snapshot.status, JobStatus::Unknown);
        assert!(snapshot.kind.is_none());
    }

    #[test]
    fn test_created_job_is_queued() {
        let store = JobStore::new();
        let id = store.create(JobKind::Proxy);
        let snapshot = store.get(&id);
        assert_eq!(snapshot.status, JobStatus::Queued);
        assert_eq!(snapshot.kind, Some(JobKind::Proxy));
        assert!(snapshot.errors.is_empty());
    }

    #[tokio::test]
    async fn test_runner_drives_job_terminal() {
        let store = JobStore::new();
        let runner = JobRunner::new(store.clone(), 2);

        let id = runner.submit(JobKind::Relocate, |mut handle| async move {
            handle.update(|s| s.progress.total = 1);
            handle.update(|s| s.progress.completed = 1);
            handle
        });

        // Poll until terminal; the task owns the snapshot until then.
        for _ in 0..100 {
            if store.get(&id).status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = store.get(&id);
        assert_eq!(snapshot.status, JobStatus::Done);
        assert_eq!(snapshot.progress.completed, 1);
    }

    #[tokio::test]
    async fn test_errors_make_job_done_with_errors() {
        let store = JobStore::new();
        let runner = JobRunner::new(store.clone(), 1);

        let id = runner.submit(JobKind::Proxy, |mut handle| async move {
            handle.record_error("clip.mov: boom".to_string());
            handle
        });

        for _ in 0..100 {
            if store.get(&id).status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = store.get(&id);
        assert_eq!(snapshot.status, JobStatus::DoneWithErrors);
        assert_eq!(snapshot.errors, vec!["clip.mov: boom".to_string()]);
    }
}
