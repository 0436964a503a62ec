use actix_web::{web, HttpResponse};
use job_queue::AddOptions;
use media_core::{Environment, Job, JobMetadata, JobStatus, Resolution};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::pipeline::QueuePayload;
use crate::services::Services;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub key: String,
    pub resolutions: Option<Vec<Resolution>>,
    pub priority: Option<i32>,
    #[serde(rename = "videoName")]
    pub video_name: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    #[serde(rename = "originalKey")]
    pub original_key: String,
    #[serde(rename = "videoName")]
    pub video_name: String,
    pub environment: &'static str,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
    pub resolutions: Vec<Resolution>,
    pub status: &'static str,
    pub message: String,
}

/// `POST /transcode`. Validates the request, writes the job row, enqueues the
/// queue entry, and returns the `queued` acknowledgement.
pub async fn submit(services: web::Data<Services>, req: web::Json<SubmitRequest>) -> Result<HttpResponse> {
    if req.key.trim().is_empty() {
        return Err(AppError::Validation("key must not be empty".to_string()));
    }
    if let Some(url) = &req.callback_url {
        if !media_core::validate::is_http_url(url) {
            return Err(AppError::Validation("callback_url must be an http(s) URL".to_string()));
        }
    }

    let video_name = req
        .video_name
        .clone()
        .unwrap_or_else(|| media_core::validate::default_video_name(&req.key));
    if !media_core::validate::is_valid_video_name(&video_name) {
        return Err(AppError::Validation(
            "videoName must contain only alphanumeric characters, hyphens, and underscores".to_string(),
        ));
    }

    let resolutions = req.resolutions.clone().unwrap_or_else(|| Resolution::ALL.to_vec());
    if resolutions.is_empty() {
        return Err(AppError::Validation("resolutions must not be empty".to_string()));
    }

    let callback_url = req.callback_url.clone().or_else(|| services.config.webapp_callback_url.clone());
    let environment = Environment::derive(callback_url.as_deref());

    let job_id = Uuid::new_v4();
    let job = Job::new(
        job_id,
        req.key.clone(),
        resolutions.clone(),
        JobMetadata {
            video_name: video_name.clone(),
            environment,
            callback_url: callback_url.clone(),
        },
    );
    crate::db::jobs::create_job(&services.job_store, &job).await?;

    let payload = QueuePayload {
        original_key: req.key.clone(),
        resolutions: resolutions.clone(),
        video_name: video_name.clone(),
        environment,
        callback_url: callback_url.clone(),
    };
    let payload_json = serde_json::to_value(&payload)
        .map_err(|e| AppError::Internal(format!("failed to serialize queue payload: {e}")))?;

    let opts = AddOptions {
        priority: req.priority.unwrap_or(0),
        ..AddOptions::default()
    };
    services.queue.add(job_id, payload_json, opts).await?;

    Ok(HttpResponse::Ok().json(SubmitResponse {
        success: true,
        job_id,
        original_key: req.key.clone(),
        video_name,
        environment: environment.as_str(),
        callback_url,
        resolutions,
        status: "queued",
        message: "job queued".to_string(),
    }))
}

pub async fn get_job(services: web::Data<Services>, job_id: web::Path<Uuid>) -> Result<HttpResponse> {
    let job = crate::db::jobs::get_job(&services.job_store, job_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;
    Ok(HttpResponse::Ok().json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_jobs(services: web::Data<Services>, query: web::Query<ListQuery>) -> Result<HttpResponse> {
    let jobs: Vec<Job> = if let Some(status) = &query.status {
        let status = JobStatus::from_str_loose(status)
            .ok_or_else(|| AppError::Validation(format!("unknown status {status}")))?;
        crate::db::jobs::list_by_status(&services.job_store, status).await?
    } else {
        let limit = query.limit.unwrap_or(20).clamp(1, 200);
        let page = query.page.unwrap_or(1).max(1);
        crate::db::jobs::list(&services.job_store, limit, (page - 1) * limit).await?
    };
    Ok(HttpResponse::Ok().json(jobs))
}

/// `DELETE /job/{id}`. Cancels a job that hasn't started processing yet:
/// removes its queue entry and marks it `failed` with a "cancelled by user"
/// error. A job already `processing`, `completed`, or `failed` is rejected —
/// cancellation only pre-empts work that hasn't started.
pub async fn delete_job(services: web::Data<Services>, job_id: web::Path<Uuid>) -> Result<HttpResponse> {
    let job_id = job_id.into_inner();
    let job = crate::db::jobs::get_job(&services.job_store, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;
    if job.status != JobStatus::Queued {
        return Err(AppError::Conflict("only queued jobs may be cancelled".to_string()));
    }

    services.queue.remove_by_job(job_id).await?;
    crate::db::jobs::update_status(&services.job_store, job_id, JobStatus::Failed).await?;
    crate::db::jobs::set_error(&services.job_store, job_id, "cancelled by user").await?;
    Ok(HttpResponse::NoContent().finish())
}

/// `POST /job/{id}/retry`. Resets the job row to `queued` and re-enqueues a
/// fresh queue entry from its stored metadata; the worker's checkpoint
/// continues from whatever stage already landed on disk.
pub async fn retry_job(services: web::Data<Services>, job_id: web::Path<Uuid>) -> Result<HttpResponse> {
    let job_id = job_id.into_inner();
    let job = crate::db::jobs::get_job(&services.job_store, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;
    if job.status != JobStatus::Failed {
        return Err(AppError::Conflict("only failed jobs may be retried".to_string()));
    }

    crate::db::jobs::update_status(&services.job_store, job_id, JobStatus::Queued).await?;

    let payload = QueuePayload {
        original_key: job.original_key.clone(),
        resolutions: job.resolutions.clone(),
        video_name: job.metadata.video_name.clone(),
        environment: job.metadata.environment,
        callback_url: job.metadata.callback_url.clone(),
    };
    let payload_json = serde_json::to_value(&payload)
        .map_err(|e| AppError::Internal(format!("failed to serialize queue payload: {e}")))?;
    services.queue.add(job_id, payload_json, AddOptions::default()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "jobId": job_id })))
}
