use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use media_core::constants::{ENCODER_CRF, HLS_SEGMENT_DURATION_SECS, HLS_SEGMENT_PATTERN};
use media_core::resolution::Profile;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::EncoderError;
use crate::probe::{self, ProbeResult};

/// Invoked with a percentage estimate (0..=100) as the encoder reports
/// progress. Boxed so callers can close over per-job state (job id, stage).
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

#[async_trait]
pub trait EncoderDriver: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, EncoderError>;

    async fn transcode_hls(
        &self,
        input: &Path,
        output_dir: &Path,
        profile: &Profile,
        progress_cb: ProgressCallback,
    ) -> Result<(), EncoderError>;

    async fn thumbnail(
        &self,
        input: &Path,
        output_path: &Path,
        timestamp_s: f64,
        width: u32,
        height: u32,
    ) -> Result<(), EncoderError>;
}

/// Drives the external `ffmpeg`/`ffprobe` binaries as child processes. The
/// binary names are configurable (`ENCODER_BIN`/`PROBE_BIN`) so tests can
/// point at a stub.
pub struct FfmpegDriver {
    encoder_bin: String,
    probe_bin: String,
}

impl FfmpegDriver {
    pub fn new(encoder_bin: impl Into<String>, probe_bin: impl Into<String>) -> Self {
        FfmpegDriver {
            encoder_bin: encoder_bin.into(),
            probe_bin: probe_bin.into(),
        }
    }
}

#[async_trait]
impl EncoderDriver for FfmpegDriver {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, EncoderError> {
        probe::probe(&self.probe_bin, path).await
    }

    async fn transcode_hls(
        &self,
        input: &Path,
        output_dir: &Path,
        profile: &Profile,
        progress_cb: ProgressCallback,
    ) -> Result<(), EncoderError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| EncoderError::new(Some(profile.name), e.to_string()))?;

        let total_duration_s = probe::probe(&self.probe_bin, input)
            .await
            .map(|r| r.duration_s)
            .unwrap_or(0.0);

        let playlist_path = output_dir.join("index-.m3u8");
        let segment_pattern = output_dir.join(HLS_SEGMENT_PATTERN);

        let mut command = tokio::process::Command::new(&self.encoder_bin);
        command
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!("scale={}:{}", profile.width, profile.height))
            .arg("-c:v")
            .arg("libx264")
            .arg("-profile:v")
            .arg(profile.h264_profile.as_str())
            .arg("-level")
            .arg(profile.h264_level)
            .arg("-crf")
            .arg(ENCODER_CRF.to_string())
            .arg("-maxrate")
            .arg(format!("{}k", profile.maxrate_kbps()))
            .arg("-bufsize")
            .arg(format!("{}k", profile.bufsize_kbps()))
            .arg("-b:a")
            .arg(format!("{}k", profile.audio_kbps))
            .arg("-hls_time")
            .arg(HLS_SEGMENT_DURATION_SECS.to_string())
            .arg("-hls_playlist_type")
            .arg("vod")
            .arg("-hls_segment_filename")
            .arg(&segment_pattern)
            .arg("-progress")
            .arg("pipe:1")
            .arg("-nostats")
            .arg(&playlist_path)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| EncoderError::new(Some(profile.name), format!("failed to spawn encoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncoderError::new(Some(profile.name), "encoder stdout unavailable"))?;
        let resolution = profile.name;
        let progress_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(ms) = line.strip_prefix("out_time_ms=") {
                    if let Ok(ms) = ms.trim().parse::<f64>() {
                        if total_duration_s > 0.0 {
                            let pct = ((ms / 1_000_000.0) / total_duration_s * 100.0)
                                .clamp(0.0, 100.0) as u8;
                            progress_cb(pct);
                        }
                    }
                }
            }
        });

        let status = child
            .wait()
            .await
            .map_err(|e| EncoderError::new(Some(resolution), format!("encoder wait failed: {e}")))?;
        let _ = progress_task.await;

        if !status.success() {
            return Err(EncoderError::new(
                Some(resolution),
                format!("encoder exited with status {status}"),
            ));
        }
        debug!(resolution = %resolution, "transcode complete");
        Ok(())
    }

    async fn thumbnail(
        &self,
        input: &Path,
        output_path: &Path,
        timestamp_s: f64,
        width: u32,
        height: u32,
    ) -> Result<(), EncoderError> {
        if let Some(parent) = output_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let status = tokio::process::Command::new(&self.encoder_bin)
            .arg("-y")
            .arg("-ss")
            .arg(format!("{timestamp_s}"))
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .arg("-frames:v")
            .arg("1")
            .arg(output_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .status()
            .await
            .map_err(|e| EncoderError::new(None, format!("failed to spawn encoder: {e}")))?;

        if !status.success() {
            warn!(?output_path, "thumbnail generation failed");
            return Err(EncoderError::new(None, format!("thumbnail exited with {status}")));
        }
        Ok(())
    }
}

/// Lists the `.ts` segment files an emitted rendition directory contains, in
/// lexical order — they share the `index-%05d.ts` naming from the HLS
/// parameters, so lexical order is also playback order.
pub async fn list_segments(output_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    let mut segments = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("ts") {
            segments.push(path);
        }
    }
    segments.sort();
    Ok(segments)
}

pub type SharedEncoderDriver = Arc<dyn EncoderDriver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_segments_returns_ts_files_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index-00002.ts"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("index-00001.ts"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("index-.m3u8"), b"").await.unwrap();

        let segments = list_segments(dir.path()).await.unwrap();
        let names: Vec<_> = segments.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["index-00001.ts", "index-00002.ts"]);
    }

    #[tokio::test]
    async fn list_segments_ignores_non_ts_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index-.m3u8"), b"").await.unwrap();
        let segments = list_segments(dir.path()).await.unwrap();
        assert!(segments.is_empty());
    }
}
