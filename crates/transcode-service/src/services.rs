use std::sync::Arc;

use encoder::{EncoderDriver, FfmpegDriver};
use job_queue::Queue;
use object_store_client::{ObjectStore, ObjectStoreConfig, S3ObjectStore};
use sqlx::SqlitePool;

use crate::callback::CallbackClient;
use crate::config::Config;

/// The explicit long-lived-state bundle constructed at startup and threaded
/// through HTTP handlers and the pipeline — no implicit global singletons.
/// Initialization order: job store -> queue -> HTTP.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub job_store: SqlitePool,
    pub queue: Queue,
    pub object_store: Arc<dyn ObjectStore>,
    pub encoder: Arc<dyn EncoderDriver>,
    pub callback: Arc<CallbackClient>,
}

impl Services {
    pub async fn bootstrap(config: Config) -> Result<Self, String> {
        let job_store = crate::db::connect(&config.database_url)
            .await
            .map_err(|e| format!("failed to open job store: {e}"))?;

        let queue = Queue::connect(&config.redis_url, "transcode")
            .await
            .map_err(|e| format!("failed to reach queue backend: {e}"))?;

        let object_store_config = ObjectStoreConfig::from_env()?;
        let object_store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(object_store_config));

        let encoder: Arc<dyn EncoderDriver> =
            Arc::new(FfmpegDriver::new(config.encoder_bin.clone(), config.probe_bin.clone()));

        let callback = Arc::new(CallbackClient::new(config.callback_token.clone()));

        Ok(Services {
            config: Arc::new(config),
            job_store,
            queue,
            object_store,
            encoder,
            callback,
        })
    }
}
