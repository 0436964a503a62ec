use serde::Deserialize;
use std::path::Path;

use crate::error::EncoderError;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub codec: String,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Shells out to `ffprobe` (configurable binary) and parses its JSON report
/// into a `ProbeResult`.
pub async fn probe(probe_bin: &str, path: &Path) -> Result<ProbeResult, EncoderError> {
    let output = tokio::process::Command::new(probe_bin)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path)
        .output()
        .await
        .map_err(|e| EncoderError::new(None, format!("failed to spawn {probe_bin}: {e}")))?;

    if !output.status.success() {
        return Err(EncoderError::new(
            None,
            format!(
                "{probe_bin} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
        ));
    }

    parse_ffprobe_output(&output.stdout)
}

fn parse_ffprobe_output(stdout: &[u8]) -> Result<ProbeResult, EncoderError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| EncoderError::new(None, format!("failed to parse ffprobe output: {e}")))?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| EncoderError::new(None, "no video stream found"))?;

    Ok(ProbeResult {
        duration_s: parsed
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        bitrate: parsed
            .format
            .bit_rate
            .as_deref()
            .and_then(|b| b.parse().ok())
            .unwrap_or(0),
        codec: video_stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        size_bytes: parsed
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_resolution_and_codec() {
        let json = br#"{
            "format": {"duration": "12.345", "bit_rate": "500000", "size": "1048576"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
            ]
        }"#;
        let result = parse_ffprobe_output(json).unwrap();
        assert_eq!(result.duration_s, 12.345);
        assert_eq!(result.width, 1920);
        assert_eq!(result.height, 1080);
        assert_eq!(result.codec, "h264");
        assert_eq!(result.bitrate, 500_000);
        assert_eq!(result.size_bytes, 1_048_576);
    }

    #[test]
    fn missing_video_stream_is_an_error() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_ffprobe_output(json).is_err());
    }

    #[test]
    fn missing_optional_fields_default_to_zero() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "video"}]}"#;
        let result = parse_ffprobe_output(json).unwrap();
        assert_eq!(result.duration_s, 0.0);
        assert_eq!(result.width, 0);
        assert_eq!(result.codec, "unknown");
    }
}
