use chrono::{DateTime, Utc};
use media_core::{Job, JobCounts, JobMetadata, JobStatus};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::AppError;

/// Raw row shape — columns only, no domain types — converted via
/// [`JobRow::into_job`]. A plain `#[derive(sqlx::FromRow)]` struct plus a
/// `From`-style conversion keeps the SQL layer free of domain invariants.
#[derive(FromRow)]
struct JobRow {
    job_id: String,
    original_key: String,
    output_key: Option<String>,
    status: String,
    progress: i64,
    error_message: Option<String>,
    resolutions: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    file_size: Option<i64>,
    duration_seconds: Option<f64>,
    video_name: String,
    environment: String,
    callback_url: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, AppError> {
        let resolutions: Vec<String> = serde_json::from_str(&self.resolutions)
            .map_err(|e| AppError::Internal(format!("corrupt resolutions column: {e}")))?;
        let resolutions = resolutions
            .iter()
            .filter_map(|s| media_core::Resolution::from_str_loose(s))
            .collect();
        Ok(Job {
            job_id: Uuid::parse_str(&self.job_id)
                .map_err(|e| AppError::Internal(format!("corrupt job_id: {e}")))?,
            original_key: self.original_key,
            output_key: self.output_key,
            status: JobStatus::from_str_loose(&self.status)
                .ok_or_else(|| AppError::Internal(format!("corrupt status: {}", self.status)))?,
            progress: self.progress as u8,
            error_message: self.error_message,
            resolutions,
            created_at: parse_ts(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_ts).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            file_size: self.file_size,
            duration_seconds: self.duration_seconds,
            metadata: JobMetadata {
                video_name: self.video_name,
                environment: match self.environment.as_str() {
                    "staging" => media_core::Environment::Staging,
                    _ => media_core::Environment::Production,
                },
                callback_url: self.callback_url,
            },
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("corrupt timestamp {s}: {e}")))
}

pub async fn create_job(pool: &SqlitePool, job: &Job) -> Result<(), AppError> {
    let resolutions = serde_json::to_string(
        &job.resolutions.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    )
    .unwrap();
    sqlx::query(
        "INSERT INTO jobs (job_id, original_key, output_key, status, progress, error_message,
         resolutions, created_at, started_at, completed_at, file_size, duration_seconds,
         video_name, environment, callback_url)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.job_id.to_string())
    .bind(&job.original_key)
    .bind(&job.output_key)
    .bind(job.status.as_str())
    .bind(job.progress as i64)
    .bind(&job.error_message)
    .bind(resolutions)
    .bind(job.created_at.to_rfc3339())
    .bind(job.started_at.map(|t| t.to_rfc3339()))
    .bind(job.completed_at.map(|t| t.to_rfc3339()))
    .bind(job.file_size)
    .bind(job.duration_seconds)
    .bind(&job.metadata.video_name)
    .bind(job.metadata.environment.as_str())
    .bind(&job.metadata.callback_url)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<Job>, AppError> {
    let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(JobRow::into_job).transpose()
}

/// Enforces the legal status-transition set; an illegal transition is a
/// hard `Conflict`, never a silent no-op.
pub async fn update_status(
    pool: &SqlitePool,
    job_id: Uuid,
    next: JobStatus,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let current: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let current = current
        .and_then(|(s,)| JobStatus::from_str_loose(&s))
        .ok_or_else(|| AppError::NotFound(job_id.to_string()))?;

    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "illegal status transition {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let now = Utc::now().to_rfc3339();
    match next {
        JobStatus::Processing => {
            sqlx::query("UPDATE jobs SET status = ?, started_at = ? WHERE job_id = ?")
                .bind(next.as_str())
                .bind(now)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        JobStatus::Completed | JobStatus::Failed => {
            sqlx::query("UPDATE jobs SET status = ?, completed_at = ? WHERE job_id = ?")
                .bind(next.as_str())
                .bind(now)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        JobStatus::Queued => {
            sqlx::query(
                "UPDATE jobs SET status = ?, progress = 0, error_message = NULL,
                 started_at = NULL, completed_at = NULL WHERE job_id = ?",
            )
            .bind(next.as_str())
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

pub async fn update_progress(pool: &SqlitePool, job_id: Uuid, progress: u8) -> Result<(), AppError> {
    sqlx::query("UPDATE jobs SET progress = ? WHERE job_id = ?")
        .bind(progress as i64)
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_error(pool: &SqlitePool, job_id: Uuid, message: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE jobs SET error_message = ? WHERE job_id = ?")
        .bind(message)
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn complete_job(
    pool: &SqlitePool,
    job_id: Uuid,
    output_key: &str,
    file_size: i64,
    duration_seconds: f64,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE jobs SET output_key = ?, file_size = ?, duration_seconds = ?, progress = 100
         WHERE job_id = ?",
    )
    .bind(output_key)
    .bind(file_size)
    .bind(duration_seconds)
    .bind(job_id.to_string())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    update_status(pool, job_id, JobStatus::Completed).await
}

pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Job>, AppError> {
    let rows: Vec<JobRow> = sqlx::query_as(
        "SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(JobRow::into_job).collect()
}

pub async fn list_by_status(pool: &SqlitePool, status: JobStatus) -> Result<Vec<Job>, AppError> {
    let rows: Vec<JobRow> = sqlx::query_as(
        "SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC",
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(JobRow::into_job).collect()
}

pub async fn counts(pool: &SqlitePool) -> Result<JobCounts, AppError> {
    let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
        "SELECT
            COUNT(*) FILTER (WHERE status = 'queued'),
            COUNT(*) FILTER (WHERE status = 'processing'),
            COUNT(*) FILTER (WHERE status = 'completed'),
            COUNT(*) FILTER (WHERE status = 'failed'),
            COUNT(*)
         FROM jobs",
    )
    .fetch_one(pool)
    .await?;
    Ok(JobCounts {
        queued: row.0,
        processing: row.1,
        completed: row.2,
        failed: row.3,
        total: row.4,
    })
}

pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>, AppError> {
    list(pool, limit, 0).await
}

pub async fn delete_job(pool: &SqlitePool, job_id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use media_core::{Environment, Resolution};

    use super::*;

    async fn test_pool() -> SqlitePool {
        // A single connection, since each fresh `:memory:` connection is its
        // own database — more than one here would drift from the migrated
        // schema.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_job() -> Job {
        Job {
            job_id: Uuid::new_v4(),
            original_key: "raw/clip.mov".to_string(),
            output_key: None,
            status: JobStatus::Queued,
            progress: 0,
            error_message: None,
            resolutions: vec![Resolution::R480p, Resolution::R720p],
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            file_size: None,
            duration_seconds: None,
            metadata: JobMetadata {
                video_name: "clip".to_string(),
                environment: Environment::Staging,
                callback_url: Some("https://example.com/cb".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let pool = test_pool().await;
        let job = sample_job();
        create_job(&pool, &job).await.unwrap();

        let fetched = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.original_key, job.original_key);
        assert_eq!(fetched.resolutions, job.resolutions);
        assert_eq!(fetched.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn get_missing_job_is_none() {
        let pool = test_pool().await;
        assert!(get_job(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legal_transition_updates_status_and_timestamps() {
        let pool = test_pool().await;
        let job = sample_job();
        create_job(&pool, &job).await.unwrap();

        update_status(&pool, job.job_id, JobStatus::Processing).await.unwrap();
        let fetched = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Processing);
        assert!(fetched.started_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let pool = test_pool().await;
        let job = sample_job();
        create_job(&pool, &job).await.unwrap();

        let err = update_status(&pool, job.job_id, JobStatus::Completed).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn complete_job_sets_output_and_full_progress() {
        let pool = test_pool().await;
        let job = sample_job();
        create_job(&pool, &job).await.unwrap();
        update_status(&pool, job.job_id, JobStatus::Processing).await.unwrap();

        complete_job(&pool, job.job_id, "demo/index.m3u8", 4096, 12.5).await.unwrap();
        let fetched = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.output_key.as_deref(), Some("demo/index.m3u8"));
        assert_eq!(fetched.progress, 100);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn counts_reflect_status_distribution() {
        let pool = test_pool().await;
        let queued = sample_job();
        create_job(&pool, &queued).await.unwrap();
        let processing = sample_job();
        create_job(&pool, &processing).await.unwrap();
        update_status(&pool, processing.job_id, JobStatus::Processing).await.unwrap();

        let counts = counts(&pool).await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.processing, 1);
    }

    #[tokio::test]
    async fn delete_job_removes_row() {
        let pool = test_pool().await;
        let job = sample_job();
        create_job(&pool, &job).await.unwrap();
        delete_job(&pool, job.job_id).await.unwrap();
        assert!(get_job(&pool, job.job_id).await.unwrap().is_none());
    }
}
