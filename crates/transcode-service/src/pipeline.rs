use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use encoder::{EncoderDriver, RenditionEntry};
use media_core::{Environment, LogLevel, Resolution, Stage};
use object_store_client::{Bucket, ObjectStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::callback::CallbackClient;
use crate::checkpoint::{Checkpoint, UploadedFile};
use crate::db;

/// The queue entry payload this pipeline expects — `original_key,
/// resolutions, video_name, environment, callback_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    pub original_key: String,
    pub resolutions: Vec<Resolution>,
    pub video_name: String,
    pub environment: Environment,
    pub callback_url: Option<String>,
}

impl Checkpoint {
    /// Non-strict "has this stage's work already landed" check, used to
    /// guard per-stage resumption. `is_stage_completed` (strictly-past) is
    /// reserved for the top-level completed/short-circuit check, where
    /// "strictly past Uploaded" is exactly equivalent to "Completed".
    fn reached(&self, stage: Stage) -> bool {
        self.stage == stage || self.stage.is_strictly_past(stage)
    }
}

/// Runs the full nine-step stage machine for one queue entry. Holds no
/// reference to the job store's *status* column — that is the pipeline
/// adapter's job, keeping the queue backend decoupled from job-store
/// schema — but does write append-only logs and the completion callback
/// directly, since those aren't part of the status state machine.
pub struct TranscodingJobHandler {
    pub job_store: SqlitePool,
    pub object_store: Arc<dyn ObjectStore>,
    pub encoder: Arc<dyn EncoderDriver>,
    pub callback: Arc<CallbackClient>,
    pub scratch_root: PathBuf,
    pub default_callback_url: Option<String>,
}

impl TranscodingJobHandler {
    async fn log(&self, job_id: Uuid, level: LogLevel, message: &str, stage: Option<&str>) {
        if let Err(e) = db::logs::add_log(&self.job_store, job_id, level, message, stage, None).await {
            warn!(%job_id, error = %e, "failed to persist job log");
        }
    }

    async fn stage_initialize(
        &self,
        job_id: Uuid,
        payload: &QueuePayload,
        scratch_dir: &Path,
    ) -> Result<(), String> {
        tokio::fs::create_dir_all(scratch_dir)
            .await
            .map_err(|e| format!("failed to create scratch dir: {e}"))?;
        if !media_core::validate::is_supported_extension(&payload.original_key) {
            self.log(
                job_id,
                LogLevel::Warn,
                &format!("unrecognized extension for {}", payload.original_key),
                Some("initialized"),
            )
            .await;
        }
        Ok(())
    }

    async fn stage_download(
        &self,
        payload: &QueuePayload,
        local_path: &Path,
    ) -> Result<(), String> {
        if tokio::fs::metadata(local_path).await.is_ok() {
            return Ok(());
        }
        self.object_store
            .download(&payload.original_key, local_path, Bucket::Source)
            .await
            .map_err(|e| format!("Download failed: {e}"))
    }

    async fn stage_analyze(
        &self,
        local_path: &Path,
        requested: &[Resolution],
    ) -> Result<(encoder::ProbeResult, Vec<Resolution>), String> {
        let probed = self
            .encoder
            .probe(local_path)
            .await
            .map_err(|e| format!("probe failed: {e}"))?;
        let valid = media_core::resolution::valid_resolutions(requested, probed.height);
        if valid.is_empty() {
            return Err("validation: no requested resolution fits the source height".to_string());
        }
        Ok((probed, valid))
    }

    async fn stage_thumbnails(
        &self,
        job_id: Uuid,
        local_path: &Path,
        scratch_dir: &Path,
        video_name: &str,
    ) -> Vec<(PathBuf, String)> {
        let jpg_path = scratch_dir.join(format!("{video_name}-00001.jpg"));
        let png_path = scratch_dir.join(format!("{video_name}-00001.png"));
        let mut out = Vec::new();
        for (path, key_name) in [
            (&jpg_path, format!("{video_name}-00001.jpg")),
            (&png_path, format!("{video_name}-00001.png")),
        ] {
            match self
                .encoder
                .thumbnail(
                    local_path,
                    path,
                    media_core::constants::THUMBNAIL_TIMESTAMP_SECS,
                    media_core::constants::THUMBNAIL_WIDTH,
                    media_core::constants::THUMBNAIL_HEIGHT,
                )
                .await
            {
                Ok(()) => out.push((path.clone(), key_name)),
                Err(e) => {
                    self.log(
                        job_id,
                        LogLevel::Warn,
                        &format!("thumbnail generation failed: {e}"),
                        Some("thumbnails_generated"),
                    )
                    .await;
                }
            }
        }
        out
    }

    async fn transcode_and_upload_resolution(
        &self,
        job_id: Uuid,
        local_path: &Path,
        scratch_dir: &Path,
        video_name: &str,
        resolution: Resolution,
        checkpoint: &mut Checkpoint,
        checkpoint_path: &Path,
        progress: &job_queue::ProgressReporter,
        progress_before: u8,
        progress_span: u8,
    ) -> Result<(), String> {
        if checkpoint.completed_resolutions.contains(&resolution) {
            return Ok(());
        }
        let profile = resolution.profile();
        let rendition_dir = scratch_dir.join(format!("hls_{resolution}"));

        // Progress budget for this resolution splits 50/50 between encode and
        // upload: the encoder callback drives the first half as ffmpeg reports
        // its own percentage, then a final call tops up each half exactly once
        // its phase completes.
        let encode_half = progress_span / 2;
        let (encode_tx, mut encode_rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        let progress_cb: encoder::ProgressCallback = Box::new(move |p: u8| {
            let _ = encode_tx.send(p);
        });

        let forward_progress = progress.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(raw_pct) = encode_rx.recv().await {
                let mapped = progress_before
                    .saturating_add(((raw_pct as u32 * encode_half as u32) / 100) as u8)
                    .min(progress_before.saturating_add(encode_half));
                forward_progress.progress(mapped).await;
            }
        });

        let encode_result = self.encoder.transcode_hls(local_path, &rendition_dir, profile, progress_cb).await;
        let _ = forward_task.await;
        encode_result.map_err(|e| format!("encoder error for {resolution}: {e}"))?;
        progress.progress(progress_before.saturating_add(encode_half)).await;

        let playlist_key = format!("{video_name}/hls_{resolution}/index-.m3u8");
        let playlist_path = rendition_dir.join("index-.m3u8");
        self.upload_if_new(&playlist_path, &playlist_key, "application/vnd.apple.mpegurl", checkpoint)
            .await?;

        let segments = encoder::driver::list_segments(&rendition_dir)
            .await
            .map_err(|e| format!("failed to list segments for {resolution}: {e}"))?;
        for segment in segments {
            let file_name = segment
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| "invalid segment file name".to_string())?;
            let key = format!("{video_name}/hls_{resolution}/{file_name}");
            self.upload_if_new(&segment, &key, "video/mp2t", checkpoint).await?;
        }

        checkpoint.add_completed_resolution(resolution);
        checkpoint
            .save(checkpoint_path)
            .await
            .map_err(|e| format!("checkpoint save failed: {e}"))?;

        // Immediate local disk reclamation once a rendition is uploaded.
        let _ = tokio::fs::remove_dir_all(&rendition_dir).await;

        progress.progress(progress_before.saturating_add(progress_span)).await;
        info!(%job_id, %resolution, progress_before, progress_span, "resolution transcoded and uploaded");
        Ok(())
    }

    async fn upload_if_new(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), String> {
        if checkpoint.has_uploaded_key(key) {
            return Ok(());
        }
        let result = self
            .object_store
            .upload(local_path, key, content_type, Bucket::Output)
            .await
            .map_err(|e| format!("upload failed for {key}: {e}"))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(key)
            .to_string();
        checkpoint.add_uploaded_file(UploadedFile {
            name: file_name,
            key: key.to_string(),
            size: result.size,
        });
        Ok(())
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        payload: &QueuePayload,
        checkpoint: &mut Checkpoint,
        checkpoint_path: &Path,
        scratch_dir: &Path,
        progress: &job_queue::ProgressReporter,
    ) -> Result<serde_json::Value, String> {
        use media_core::constants::progress as P;

        if !checkpoint.reached(Stage::Initialized) {
            self.stage_initialize(job_id, payload, scratch_dir).await?;
            checkpoint.stage = Stage::Initialized;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::INITIALIZED_END).await;

        let local_path = scratch_dir.join("source");
        if !checkpoint.reached(Stage::Downloaded) {
            self.stage_download(payload, &local_path).await?;
            checkpoint.stage = Stage::Downloaded;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::DOWNLOADED_END).await;

        if !checkpoint.reached(Stage::Analyzed) {
            let (probed, valid) = self.stage_analyze(&local_path, &payload.resolutions).await?;
            checkpoint.valid_resolutions = valid;
            checkpoint.video_info = Some(crate::checkpoint::VideoInfo {
                duration_s: probed.duration_s,
                width: probed.width,
                height: probed.height,
                bitrate: probed.bitrate,
                codec: probed.codec,
            });
            checkpoint.stage = Stage::Analyzed;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::ANALYZED_END).await;

        if !checkpoint.reached(Stage::ThumbnailsGenerated) {
            let thumbnails =
                self.stage_thumbnails(job_id, &local_path, scratch_dir, &payload.video_name).await;
            checkpoint.thumbnail_paths = thumbnails
                .iter()
                .map(|(p, _)| p.to_string_lossy().to_string())
                .collect();
            checkpoint.stage = Stage::ThumbnailsGenerated;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::THUMBNAILS_END).await;

        if !checkpoint.reached(Stage::Transcoded) {
            let valid_resolutions = checkpoint.valid_resolutions.clone();
            let span = if valid_resolutions.is_empty() {
                0
            } else {
                P::TRANSCODE_BUDGET / valid_resolutions.len() as u8
            };
            let mut current_progress = P::TRANSCODED_UPLOADED_START;
            for resolution in &valid_resolutions {
                self.transcode_and_upload_resolution(
                    job_id,
                    &local_path,
                    scratch_dir,
                    &payload.video_name,
                    *resolution,
                    checkpoint,
                    checkpoint_path,
                    progress,
                    current_progress,
                    span,
                )
                .await?;
                current_progress = current_progress.saturating_add(span);
            }
            checkpoint.stage = Stage::Transcoded;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::TRANSCODED_UPLOADED_END).await;

        if !checkpoint.reached(Stage::Uploaded) {
            self.build_and_upload_master_playlist(checkpoint, checkpoint_path, &payload.video_name)
                .await?;
            progress.progress(P::MASTER_PLAYLIST_END).await;

            self.upload_thumbnails(checkpoint, checkpoint_path, &payload.video_name).await?;
            let _ = tokio::fs::remove_file(&local_path).await;
            checkpoint.stage = Stage::Uploaded;
            checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        }
        progress.progress(P::THUMBNAIL_UPLOAD_END).await;

        let env_str = payload.environment.as_str();
        let output_key = checkpoint
            .output_key
            .clone()
            .ok_or_else(|| "missing output key after upload stage".to_string())?;
        let duration = checkpoint
            .video_info
            .as_ref()
            .map(|v| v.duration_s)
            .unwrap_or(0.0);
        let original_resolution = checkpoint
            .video_info
            .as_ref()
            .map(|v| format!("{}x{}", v.width, v.height))
            .unwrap_or_default();

        let callback_url = payload.callback_url.clone().or_else(|| self.default_callback_url.clone());
        if let Some(url) = callback_url {
            self.callback
                .send_success(
                    &url,
                    job_id,
                    &payload.original_key,
                    &output_key,
                    &payload.video_name,
                    env_str,
                    duration,
                    original_resolution,
                )
                .await
                .map_err(|e| format!("callback delivery failed: {e}"))?;
        }
        progress.progress(P::CALLBACK_END).await;

        checkpoint.total_size = Some(checkpoint.total_uploaded_size());
        checkpoint.stage = Stage::Completed;
        checkpoint.save(checkpoint_path).await.map_err(|e| e.to_string())?;
        progress.progress(P::COMPLETE).await;

        Ok(json!({
            "outputKey": output_key,
            "totalSize": checkpoint.total_size,
            "durationSeconds": duration,
        }))
    }

    async fn build_and_upload_master_playlist(
        &self,
        checkpoint: &mut Checkpoint,
        checkpoint_path: &Path,
        video_name: &str,
    ) -> Result<(), String> {
        let entries: Vec<RenditionEntry<'static>> = checkpoint
            .completed_resolutions
            .iter()
            .map(|r| RenditionEntry { profile: r.profile() })
            .collect();
        let playlist = encoder::master_playlist(&entries);
        let key = format!("{video_name}/index.m3u8");

        if !checkpoint.has_uploaded_key(&key) {
            let tmp_path = checkpoint_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("index.m3u8");
            tokio::fs::write(&tmp_path, playlist.as_bytes())
                .await
                .map_err(|e| format!("failed to write master playlist: {e}"))?;
            self.upload_if_new(&tmp_path, &key, "application/vnd.apple.mpegurl", checkpoint)
                .await?;
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        checkpoint.output_key = Some(key);
        Ok(())
    }

    async fn upload_thumbnails(
        &self,
        checkpoint: &mut Checkpoint,
        _checkpoint_path: &Path,
        video_name: &str,
    ) -> Result<(), String> {
        let paths = checkpoint.thumbnail_paths.clone();
        for path_str in paths {
            let path = PathBuf::from(&path_str);
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let key = format!("{video_name}/{file_name}");
            let content_type = if file_name.ends_with(".png") {
                "image/png"
            } else {
                "image/jpeg"
            };
            self.upload_if_new(&path, &key, content_type, checkpoint).await?;
            let _ = tokio::fs::remove_file(&path).await;
        }
        Ok(())
    }
}

#[async_trait]
impl job_queue::JobHandler for TranscodingJobHandler {
    async fn handle(
        &self,
        entry: &job_queue::QueueEntry,
        progress: job_queue::ProgressReporter,
    ) -> Result<serde_json::Value, String> {
        let payload: QueuePayload =
            serde_json::from_value(entry.payload.clone()).map_err(|e| format!("invalid payload: {e}"))?;
        let job_id = entry.job_id;
        let scratch_dir = self.scratch_root.join(job_id.to_string());
        let checkpoint_path = scratch_dir.join("job_state.json");

        let mut checkpoint = Checkpoint::load_or_create(&checkpoint_path)
            .await
            .map_err(|e| format!("checkpoint load failed: {e}"))?;

        // Strictly past Uploaded, in this seven-stage order, means exactly
        // Completed — the one case where re-entering the pipeline must be a
        // no-op replay rather than redone work.
        if checkpoint.is_stage_completed(Stage::Uploaded) {
            let output_key = checkpoint.output_key.clone().unwrap_or_default();
            let duration = checkpoint.video_info.as_ref().map(|v| v.duration_s).unwrap_or(0.0);
            return Ok(json!({
                "outputKey": output_key,
                "totalSize": checkpoint.total_size,
                "durationSeconds": duration,
            }));
        }

        match self
            .run_stages(job_id, &payload, &mut checkpoint, &checkpoint_path, &scratch_dir, &progress)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                checkpoint.stage = Stage::Failed;
                checkpoint.error_message = Some(e.clone());
                let _ = checkpoint.save(&checkpoint_path).await;
                self.log(job_id, LogLevel::Error, &e, Some("failed")).await;

                let callback_url = payload.callback_url.clone().or_else(|| self.default_callback_url.clone());
                if let Some(url) = callback_url {
                    if let Err(cb_err) = self
                        .callback
                        .send_failure(&url, job_id, &payload.original_key, payload.environment.as_str(), e.clone())
                        .await
                    {
                        warn!(%job_id, error = %cb_err, "failure callback delivery failed");
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_is_true_on_exact_match() {
        let mut cp = Checkpoint::new();
        cp.stage = Stage::Analyzed;
        assert!(cp.reached(Stage::Analyzed));
    }

    #[test]
    fn reached_is_true_when_strictly_past() {
        let mut cp = Checkpoint::new();
        cp.stage = Stage::Transcoded;
        assert!(cp.reached(Stage::Analyzed));
    }

    #[test]
    fn reached_is_false_when_not_yet_there() {
        let mut cp = Checkpoint::new();
        cp.stage = Stage::Downloaded;
        assert!(!cp.reached(Stage::Analyzed));
    }

    #[test]
    fn is_stage_completed_requires_strictly_past() {
        let mut cp = Checkpoint::new();
        cp.stage = Stage::Uploaded;
        assert!(!cp.is_stage_completed(Stage::Uploaded));
        cp.stage = Stage::Completed;
        assert!(cp.is_stage_completed(Stage::Uploaded));
    }

    #[test]
    fn queue_payload_round_trips_through_json() {
        let payload = QueuePayload {
            original_key: "raw/input.mov".to_string(),
            resolutions: vec![Resolution::R480p, Resolution::R720p],
            video_name: "demo".to_string(),
            environment: Environment::Staging,
            callback_url: Some("https://example.com/cb".to_string()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        let back: QueuePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.original_key, payload.original_key);
        assert_eq!(back.resolutions, payload.resolutions);
    }
}
