use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CallbackMetadata {
    duration: f64,
    #[serde(rename = "originalResolution")]
    original_resolution: String,
}

#[derive(Serialize)]
struct SuccessPayload {
    #[serde(rename = "jobId")]
    job_id: Uuid,
    #[serde(rename = "originalKey")]
    original_key: String,
    #[serde(rename = "outputKey")]
    output_key: String,
    #[serde(rename = "videoName")]
    video_name: String,
    environment: &'static str,
    status: &'static str,
    timestamp: String,
    metadata: CallbackMetadata,
}

#[derive(Serialize)]
struct FailurePayload {
    #[serde(rename = "jobId")]
    job_id: Uuid,
    #[serde(rename = "originalKey")]
    original_key: String,
    environment: &'static str,
    status: &'static str,
    error: String,
    timestamp: String,
}

/// POSTs the completion callback: bearer auth, JSON body, 10s timeout. Used
/// both for the terminal-success notification and the best-effort failure
/// notification.
pub struct CallbackClient {
    http: reqwest::Client,
    token: String,
}

impl CallbackClient {
    pub fn new(token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .expect("reqwest client configuration is static and always valid");
        CallbackClient { http, token }
    }

    pub async fn send_success(
        &self,
        url: &str,
        job_id: Uuid,
        original_key: &str,
        output_key: &str,
        video_name: &str,
        environment: &'static str,
        duration: f64,
        original_resolution: String,
    ) -> Result<(), reqwest::Error> {
        let body = SuccessPayload {
            job_id,
            original_key: original_key.to_string(),
            output_key: output_key.to_string(),
            video_name: video_name.to_string(),
            environment,
            status: "completed",
            timestamp: Utc::now().to_rfc3339(),
            metadata: CallbackMetadata { duration, original_resolution },
        };
        self.post(url, &body).await
    }

    pub async fn send_failure(
        &self,
        url: &str,
        job_id: Uuid,
        original_key: &str,
        environment: &'static str,
        error: String,
    ) -> Result<(), reqwest::Error> {
        let body = FailurePayload {
            job_id,
            original_key: original_key.to_string(),
            environment,
            status: "failed",
            error,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.post(url, &body).await
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<(), reqwest::Error> {
        self.http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_payload_uses_camel_case_field_names() {
        let body = SuccessPayload {
            job_id: Uuid::nil(),
            original_key: "src/in.mp4".to_string(),
            output_key: "out/index.m3u8".to_string(),
            video_name: "demo".to_string(),
            environment: "staging",
            status: "completed",
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            metadata: CallbackMetadata { duration: 12.5, original_resolution: "1920x1080".to_string() },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["jobId"], serde_json::json!(Uuid::nil()));
        assert_eq!(value["originalKey"], "src/in.mp4");
        assert_eq!(value["outputKey"], "out/index.m3u8");
        assert_eq!(value["videoName"], "demo");
        assert_eq!(value["metadata"]["originalResolution"], "1920x1080");
        assert!(value.get("original_key").is_none());
    }

    #[test]
    fn failure_payload_uses_camel_case_field_names() {
        let body = FailurePayload {
            job_id: Uuid::nil(),
            original_key: "src/in.mp4".to_string(),
            environment: "production",
            status: "failed",
            error: "probe failed".to_string(),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["jobId"], serde_json::json!(Uuid::nil()));
        assert_eq!(value["originalKey"], "src/in.mp4");
        assert_eq!(value["error"], "probe failed");
    }
}
