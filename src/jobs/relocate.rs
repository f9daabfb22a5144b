//! Relocation batches as tracked background jobs

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;

use crate::services::relocator::{RelocationEvent, Relocator};

use super::{JobKind, JobRunner};

/// Submit a relocation batch and return its job id immediately. Files are
/// processed and reported in submission order; per-file failures accumulate
/// on the snapshot without aborting the batch.
pub fn spawn_batch(
    runner: &JobRunner,
    relocator: Arc<Relocator>,
    sources: Vec<PathBuf>,
    dest_dir: PathBuf,
) -> String {
    runner.submit(JobKind::Relocate, move |mut handle| async move {
        // Source sizes drive byte-level progress; unreadable sources count
        // as zero and will surface as per-file errors during the batch.
        let mut sizes = Vec::with_capacity(sources.len());
        for source in &sources {
            sizes.push(fs::metadata(source).await.map(|m| m.len()).unwrap_or(0));
        }
        let total_bytes: u64 = sizes.iter().sum();

        handle.update(|s| {
            s.progress.total = sources.len();
            s.progress.total_bytes = total_bytes;
        });

        let mut bytes_done: u64 = 0;
        relocator
            .relocate_batch(&sources, &dest_dir, |event| match event {
                RelocationEvent::Started { source, .. } => handle.update(|s| {
                    s.progress.current = Some(source.to_string_lossy().to_string());
                    s.progress.percent = Some(0);
                }),
                RelocationEvent::Progress { progress, .. } => handle.update(|s| {
                    s.progress.percent = Some(progress.percent);
                    s.progress.bytes_moved = bytes_done + progress.bytes;
                }),
                RelocationEvent::Moved { index, target } => {
                    bytes_done += sizes[index];
                    handle.update(|s| {
                        s.progress.completed += 1;
                        s.progress.percent = Some(100);
                        s.progress.bytes_moved = bytes_done;
                        s.outputs.push(target.to_string_lossy().to_string());
                    });
                }
                RelocationEvent::Failed { message, .. } => handle.update(|s| {
                    s.progress.completed += 1;
                    s.errors.push(message);
                }),
            })
            .await;

        handle
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, JobStore};
    use crate::services::relocator::FallbackTool;
    use std::fs as std_fs;
    use std::time::Duration;

    async fn wait_terminal(store: &JobStore, id: &str) -> crate::jobs::JobSnapshot {
        for _ in 0..200 {
            let snapshot = store.get(id);
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_batch_job_happy_path() {
        let base = tempfile::tempdir().unwrap();
        let relocator = Arc::new(Relocator::with_fallback(
            base.path().to_path_buf(),
            FallbackTool::Manual,
        ));
        let store = JobStore::new();
        let runner = JobRunner::new(store.clone(), 2);

        let mut sources = Vec::new();
        for i in 0..3 {
            let p = base.path().join(format!("clip{i}.mov"));
            std_fs::write(&p, b"payload").unwrap();
            sources.push(p);
        }

        let id = spawn_batch(
            &runner,
            relocator,
            sources,
            base.path().join("quarantine"),
        );
        assert!(id.starts_with("relocate:"));

        let snapshot = wait_terminal(&store, &id).await;
        assert_eq!(snapshot.status, JobStatus::Done);
        assert_eq!(snapshot.progress.completed, 3);
        assert_eq!(snapshot.progress.total, 3);
        assert_eq!(snapshot.progress.bytes_moved, 21);
        assert_eq!(snapshot.outputs.len(), 3);
        assert!(snapshot.errors.is_empty());
    }

    #[tokio::test]
    async fn test_batch_job_records_failure_and_continues() {
        let base = tempfile::tempdir().unwrap();
        let relocator = Arc::new(Relocator::with_fallback(
            base.path().to_path_buf(),
            FallbackTool::Manual,
        ));
        let store = JobStore::new();
        let runner = JobRunner::new(store.clone(), 2);

        let mut sources = Vec::new();
        for i in 0..5 {
            let p = base.path().join(format!("clip{i}.mov"));
            if i != 2 {
                std_fs::write(&p, b"payload").unwrap();
            }
            sources.push(p);
        }

        let id = spawn_batch(
            &runner,
            relocator,
            sources,
            base.path().join("quarantine"),
        );
        let snapshot = wait_terminal(&store, &id).await;

        assert_eq!(snapshot.status, JobStatus::DoneWithErrors);
        assert_eq!(snapshot.outputs.len(), 4);
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.errors[0].contains("clip2.mov"));
        assert_eq!(snapshot.progress.total, 5);
        assert_eq!(snapshot.progress.completed, 5);
    }
}
