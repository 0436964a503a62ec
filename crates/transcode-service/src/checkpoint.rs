use std::path::Path;

use chrono::{DateTime, Utc};
use media_core::{Resolution, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub key: String,
    pub size: i64,
}

/// Per-job on-disk stage/progress file enabling crash-resume. Whole-file
/// JSON, read/written with fsync; owned exclusively by the worker holding
/// the job's queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    pub completed_resolutions: Vec<Resolution>,
    pub uploaded_files: Vec<UploadedFile>,
    pub video_info: Option<VideoInfo>,
    pub valid_resolutions: Vec<Resolution>,
    pub thumbnail_paths: Vec<String>,
    pub updated_at: DateTime<Utc>,
    /// Populated once `stage == Completed`, so a short-circuited replay can
    /// reconstruct the pipeline's return value without redoing any work.
    pub output_key: Option<String>,
    pub total_size: Option<i64>,
    pub error_message: Option<String>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Checkpoint {
            stage: Stage::NotStarted,
            completed_resolutions: Vec::new(),
            uploaded_files: Vec::new(),
            video_info: None,
            valid_resolutions: Vec::new(),
            thumbnail_paths: Vec::new(),
            updated_at: Utc::now(),
            output_key: None,
            total_size: None,
            error_message: None,
        }
    }

    pub async fn load_or_create(path: &Path) -> std::io::Result<Checkpoint> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Checkpoint::new())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Checkpoint::new()),
            Err(e) => Err(e),
        }
    }

    /// Whole-file write followed by an explicit fsync, so a crash never
    /// leaves a partially-written checkpoint readable by the next attempt.
    pub async fn save(&mut self, path: &Path) -> std::io::Result<()> {
        self.updated_at = Utc::now();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_vec_pretty(self)?;
        let mut file = tokio::fs::File::create(path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(&serialized).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// True only when the recorded stage is strictly past `stage` — an exact
    /// match is not "completed".
    pub fn is_stage_completed(&self, stage: Stage) -> bool {
        self.stage.is_strictly_past(stage)
    }

    pub fn add_uploaded_file(&mut self, file: UploadedFile) {
        if !self.uploaded_files.iter().any(|f| f.key == file.key) {
            self.uploaded_files.push(file);
        }
    }

    pub fn has_uploaded_key(&self, key: &str) -> bool {
        self.uploaded_files.iter().any(|f| f.key == key)
    }

    pub fn add_completed_resolution(&mut self, r: Resolution) {
        if !self.completed_resolutions.contains(&r) {
            self.completed_resolutions.push(r);
        }
    }

    pub fn total_uploaded_size(&self) -> i64 {
        self.uploaded_files.iter().map(|f| f.size).sum()
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Checkpoint::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_state.json");
        let mut cp = Checkpoint::new();
        cp.stage = Stage::Downloaded;
        cp.add_completed_resolution(Resolution::R720p);
        cp.save(&path).await.unwrap();

        let reloaded = Checkpoint::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded.stage, Stage::Downloaded);
        assert_eq!(reloaded.completed_resolutions, vec![Resolution::R720p]);
    }

    #[tokio::test]
    async fn missing_file_creates_not_started_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let cp = Checkpoint::load_or_create(&path).await.unwrap();
        assert_eq!(cp.stage, Stage::NotStarted);
    }

    #[test]
    fn uploaded_file_idempotent_by_key() {
        let mut cp = Checkpoint::new();
        cp.add_uploaded_file(UploadedFile { name: "a".into(), key: "k".into(), size: 1 });
        cp.add_uploaded_file(UploadedFile { name: "a2".into(), key: "k".into(), size: 1 });
        assert_eq!(cp.uploaded_files.len(), 1);
    }

    #[test]
    fn completed_resolution_idempotent_by_value() {
        let mut cp = Checkpoint::new();
        cp.add_completed_resolution(Resolution::R480p);
        cp.add_completed_resolution(Resolution::R480p);
        assert_eq!(cp.completed_resolutions.len(), 1);
    }
}
