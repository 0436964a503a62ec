use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use media_core::Stage;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::checkpoint::Checkpoint;

const COMPLETED_RETENTION: Duration = Duration::from_secs(3600);
const FAILED_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Periodic scan of the scratch directory: completed job
/// directories older than an hour and failed ones older than a day are
/// deleted; directories with no checkpoint file at all are orphans and go
/// immediately. Treats every checkpoint file as read-only, per the "worker
/// mutates it, reaper only reads it" ownership rule.
pub async fn run(scratch_root: std::path::PathBuf, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        match sweep(&scratch_root).await {
            Ok(freed) if freed > 0 => info!(bytes_freed = freed, "reaper sweep complete"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reaper sweep failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn sweep(scratch_root: &Path) -> std::io::Result<u64> {
    let mut freed = 0u64;
    let mut entries = match tokio::fs::read_dir(scratch_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let checkpoint_path = path.join("job_state.json");
        let should_delete = match tokio::fs::read(&checkpoint_path).await {
            Ok(bytes) => match serde_json::from_slice::<Checkpoint>(&bytes) {
                Ok(cp) => is_stale(&cp),
                Err(_) => true,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(_) => false,
        };

        if should_delete {
            freed += dir_size(&path).await.unwrap_or(0);
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(?path, error = %e, "failed to remove stale scratch directory");
            }
        }
    }
    Ok(freed)
}

fn is_stale(checkpoint: &Checkpoint) -> bool {
    let age = Utc::now().signed_duration_since(checkpoint.updated_at).num_seconds().max(0) as u64;
    match checkpoint.stage {
        Stage::Completed => age > COMPLETED_RETENTION.as_secs(),
        Stage::Failed => age > FAILED_RETENTION.as_secs(),
        _ => false,
    }
}

async fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn checkpoint_with_age(stage: Stage, age: ChronoDuration) -> Checkpoint {
        let mut cp = Checkpoint::new();
        cp.stage = stage;
        cp.updated_at = Utc::now() - age;
        cp
    }

    #[test]
    fn completed_job_stale_after_retention() {
        let cp = checkpoint_with_age(Stage::Completed, ChronoDuration::seconds(3700));
        assert!(is_stale(&cp));
    }

    #[test]
    fn completed_job_not_yet_stale() {
        let cp = checkpoint_with_age(Stage::Completed, ChronoDuration::seconds(60));
        assert!(!is_stale(&cp));
    }

    #[test]
    fn failed_job_uses_longer_retention() {
        let cp = checkpoint_with_age(Stage::Failed, ChronoDuration::seconds(3700));
        assert!(!is_stale(&cp));
        let cp = checkpoint_with_age(Stage::Failed, ChronoDuration::hours(25));
        assert!(is_stale(&cp));
    }

    #[test]
    fn in_progress_job_never_stale() {
        let cp = checkpoint_with_age(Stage::Transcoded, ChronoDuration::days(30));
        assert!(!is_stale(&cp));
    }

    #[tokio::test]
    async fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"1234").await.unwrap();
        let nested = dir.path().join("nested");
        tokio::fs::create_dir(&nested).await.unwrap();
        tokio::fs::write(nested.join("b.txt"), b"12345678").await.unwrap();

        let total = dir_size(dir.path()).await.unwrap();
        assert_eq!(total, 12);
    }

    #[tokio::test]
    async fn sweep_removes_stale_and_orphan_dirs_only() {
        let root = tempfile::tempdir().unwrap();

        let stale_dir = root.path().join("stale");
        tokio::fs::create_dir(&stale_dir).await.unwrap();
        let stale_cp = checkpoint_with_age(Stage::Completed, ChronoDuration::seconds(7200));
        tokio::fs::write(stale_dir.join("job_state.json"), serde_json::to_vec(&stale_cp).unwrap())
            .await
            .unwrap();

        let fresh_dir = root.path().join("fresh");
        tokio::fs::create_dir(&fresh_dir).await.unwrap();
        let fresh_cp = checkpoint_with_age(Stage::Transcoded, ChronoDuration::seconds(5));
        tokio::fs::write(fresh_dir.join("job_state.json"), serde_json::to_vec(&fresh_cp).unwrap())
            .await
            .unwrap();

        let orphan_dir = root.path().join("orphan");
        tokio::fs::create_dir(&orphan_dir).await.unwrap();

        sweep(root.path()).await.unwrap();

        assert!(tokio::fs::metadata(&stale_dir).await.is_err());
        assert!(tokio::fs::metadata(&fresh_dir).await.is_ok());
        assert!(tokio::fs::metadata(&orphan_dir).await.is_err());
    }
}
