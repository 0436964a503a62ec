use std::io;
use std::sync::Arc;

use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing_actix_web::TracingLogger;
use transcode_service::{pipeline::TranscodingJobHandler, Config, Services};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("failed to load configuration");
    let bind_address = format!("0.0.0.0:{}", config.port);
    let api_key = config.api_key.clone();
    let scratch_root = config.scratch_root.clone();
    let reaper_interval = config.reaper_interval;
    let worker_concurrency = config.max_concurrent_jobs;
    let stall_window = config.stall_window;
    let clean_interval = config.queue_clean_interval;

    let services = Services::bootstrap(config)
        .await
        .expect("failed to bootstrap services");
    let services_data = web::Data::new(services.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(256);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(actix_middleware::Logger::default())
            .app_data(services_data.clone())
            .configure(|cfg| transcode_service::handlers::configure(cfg, api_key.clone()))
    })
    .bind(&bind_address)?
    .run();

    let mut tasks = JoinSet::new();

    tasks.spawn(async move {
        tracing::info!("HTTP server listening");
        server.await
    });

    let handler = Arc::new(TranscodingJobHandler {
        job_store: services.job_store.clone(),
        object_store: services.object_store.clone(),
        encoder: services.encoder.clone(),
        callback: services.callback.clone(),
        scratch_root: scratch_root.clone(),
        default_callback_url: services.config.webapp_callback_url.clone(),
    });

    let worker_config = job_queue::WorkerConfig {
        concurrency: worker_concurrency,
        stall_window,
        clean_interval,
        ..job_queue::WorkerConfig::default()
    };
    let queue = services.queue.clone();
    let worker_shutdown = shutdown_rx.clone();
    tasks.spawn(async move {
        queue.process(handler, worker_config, event_tx, worker_shutdown).await;
        Ok::<(), io::Error>(())
    });

    let job_store = services.job_store.clone();
    tasks.spawn(async move {
        transcode_service::adapter::run(job_store, event_rx).await;
        Ok::<(), io::Error>(())
    });

    let reaper_shutdown = shutdown_rx.clone();
    tasks.spawn(async move {
        transcode_service::reaper::run(scratch_root, reaper_interval, reaper_shutdown).await;
        Ok::<(), io::Error>(())
    });

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut first_error = None;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "task error");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "task join error");
                if first_error.is_none() {
                    first_error = Some(io::Error::new(io::ErrorKind::Other, e.to_string()));
                }
            }
        }
    }

    tracing::info!("transcode-service shutting down");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
