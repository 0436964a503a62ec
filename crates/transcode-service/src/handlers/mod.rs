/// HTTP handlers for the submission API: job submission/inspection, queue
/// control, and the unauthenticated health probe.
pub mod health;
pub mod jobs;
pub mod queue;

use actix_web::web;

use crate::middleware::ApiKeyAuth;

/// Wires every submission API route. Mutating/inspection routes sit
/// behind [`ApiKeyAuth`]; `/health` stays open for load balancer probes.
pub fn configure(cfg: &mut web::ServiceConfig, api_key: String) {
    cfg.service(web::resource("/health").route(web::get().to(health::health)));

    cfg.service(
        web::scope("")
            .wrap(ApiKeyAuth::new(api_key))
            .route("/transcode", web::post().to(jobs::submit))
            .route("/job/{id}", web::get().to(jobs::get_job))
            .route("/job/{id}", web::delete().to(jobs::delete_job))
            .route("/job/{id}/retry", web::post().to(jobs::retry_job))
            .route("/jobs", web::get().to(jobs::list_jobs))
            .route("/queue/stats", web::get().to(queue::stats))
            .route("/queue/pause", web::post().to(queue::pause))
            .route("/queue/resume", web::post().to(queue::resume))
            .route("/queue/status", web::get().to(queue::status)),
    );
}
