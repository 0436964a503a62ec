use actix_web::{web, HttpResponse};

use crate::error::Result;
use crate::services::Services;

pub async fn stats(services: web::Data<Services>) -> Result<HttpResponse> {
    let counts = services.queue.counts().await?;
    Ok(HttpResponse::Ok().json(counts))
}

pub async fn pause(services: web::Data<Services>) -> Result<HttpResponse> {
    services.queue.pause().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "paused": true })))
}

pub async fn resume(services: web::Data<Services>) -> Result<HttpResponse> {
    services.queue.resume().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "paused": false })))
}

pub async fn status(services: web::Data<Services>) -> Result<HttpResponse> {
    let paused = services.queue.is_paused().await?;
    let counts = services.queue.counts().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "paused": paused, "counts": counts })))
}
