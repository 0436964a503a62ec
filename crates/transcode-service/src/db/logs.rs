use chrono::{DateTime, Utc};
use media_core::{JobLog, LogLevel};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::AppError;

#[derive(FromRow)]
struct LogRow {
    id: i64,
    job_id: String,
    level: String,
    message: String,
    stage: Option<String>,
    details: Option<String>,
    created_at: String,
}

impl LogRow {
    fn into_log(self) -> Result<JobLog, AppError> {
        Ok(JobLog {
            id: self.id,
            job_id: Uuid::parse_str(&self.job_id)
                .map_err(|e| AppError::Internal(format!("corrupt job_id: {e}")))?,
            level: LogLevel::from_str_loose(&self.level)
                .ok_or_else(|| AppError::Internal(format!("corrupt level: {}", self.level)))?,
            message: self.message,
            stage: self.stage,
            details: self
                .details
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| AppError::Internal(format!("corrupt details json: {e}")))?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| AppError::Internal(format!("corrupt timestamp: {e}")))?,
        })
    }
}

pub async fn add_log(
    pool: &SqlitePool,
    job_id: Uuid,
    level: LogLevel,
    message: &str,
    stage: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO job_logs (job_id, level, message, stage, details, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(job_id.to_string())
    .bind(level.as_str())
    .bind(message)
    .bind(stage)
    .bind(details.map(|d| d.to_string()))
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_logs(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<JobLog>, AppError> {
    let rows: Vec<LogRow> = sqlx::query_as(
        "SELECT * FROM job_logs WHERE job_id = ? ORDER BY created_at ASC",
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LogRow::into_log).collect()
}

pub async fn get_recent_logs(pool: &SqlitePool, limit: i64) -> Result<Vec<JobLog>, AppError> {
    let rows: Vec<LogRow> = sqlx::query_as(
        "SELECT * FROM job_logs ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LogRow::into_log).collect()
}

pub async fn get_error_logs(pool: &SqlitePool, limit: i64) -> Result<Vec<JobLog>, AppError> {
    let rows: Vec<LogRow> = sqlx::query_as(
        "SELECT * FROM job_logs WHERE level = 'error' ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LogRow::into_log).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn logs_are_returned_in_insertion_order() {
        let pool = test_pool().await;
        let job_id = Uuid::new_v4();
        add_log(&pool, job_id, LogLevel::Info, "started", Some("initialized"), None).await.unwrap();
        add_log(&pool, job_id, LogLevel::Warn, "missing extension", Some("initialized"), None)
            .await
            .unwrap();

        let logs = get_logs(&pool, job_id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "started");
        assert_eq!(logs[1].level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn get_error_logs_filters_by_level() {
        let pool = test_pool().await;
        let job_id = Uuid::new_v4();
        add_log(&pool, job_id, LogLevel::Info, "ok", None, None).await.unwrap();
        add_log(&pool, job_id, LogLevel::Error, "boom", Some("failed"), None).await.unwrap();

        let errors = get_error_logs(&pool, 10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
    }

    #[tokio::test]
    async fn details_json_round_trips() {
        let pool = test_pool().await;
        let job_id = Uuid::new_v4();
        let details = serde_json::json!({"attempt": 2});
        add_log(&pool, job_id, LogLevel::Debug, "retrying", None, Some(details.clone()))
            .await
            .unwrap();

        let logs = get_logs(&pool, job_id).await.unwrap();
        assert_eq!(logs[0].details, Some(details));
    }
}
