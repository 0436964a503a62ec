use std::time::Duration;

/// Process-wide configuration, loaded once via [`Config::from_env`] — field
/// by field with an explicit default, the way `media-service::config` does
/// it, rather than through a generic deserializer.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub max_concurrent_jobs: usize,
    pub scratch_root: std::path::PathBuf,
    pub database_url: String,
    pub webapp_callback_url: Option<String>,
    pub callback_token: String,
    pub api_key: String,
    pub encoder_bin: String,
    pub probe_bin: String,
    pub stall_window: Duration,
    pub queue_clean_interval: Duration,
    pub reaper_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let required = |name: &str| -> Result<String, String> {
            std::env::var(name).map_err(|_| format!("missing required env var {name}"))
        };
        let parsed_or = |name: &str, default: u64| -> u64 {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let callback_token = std::env::var("WEBAPP_API_KEY")
            .or_else(|_| std::env::var("CALLBACK_TOKEN"))
            .map_err(|_| "missing required env var WEBAPP_API_KEY or CALLBACK_TOKEN".to_string())?;

        Ok(Config {
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000),
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_concurrent_jobs: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            scratch_root: std::env::var("TEMP_UPLOAD_DIR")
                .or_else(|_| std::env::var("SCRATCH_ROOT"))
                .unwrap_or_else(|_| "./tmp/transcode".to_string())
                .into(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/jobs.db".to_string()),
            webapp_callback_url: std::env::var("WEBAPP_CALLBACK_URL").ok(),
            callback_token,
            api_key: required("API_KEY")?,
            encoder_bin: std::env::var("ENCODER_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            probe_bin: std::env::var("PROBE_BIN").unwrap_or_else(|_| "ffprobe".to_string()),
            stall_window: Duration::from_secs(parsed_or("STALL_WINDOW_SECS", 30)),
            queue_clean_interval: Duration::from_secs(parsed_or("QUEUE_CLEAN_INTERVAL_SECS", 3600)),
            reaper_interval: Duration::from_secs(parsed_or("REAPER_INTERVAL_SECS", 3600)),
        })
    }
}
