use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use push_service::cache::RedisCache;
use push_service::config::Config;
use push_service::consumer::PushConsumer;
use push_service::error::AppError;
use push_service::gateway::GatewayOnlinePusher;
use push_service::services::callback::HttpCallbackBus;
use push_service::services::offline_push::{FcmPusher, OfflinePusher};
use push_service::services::pusher::Pusher;
use push_service::storage::{RedisMsgReader, RedisPushStorage};
use push_service::{logging, metrics};

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let redis_client = redis::Client::open(cfg.redis_url.as_str())
        .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;

    let cache = Arc::new(RedisCache::new(redis.clone()));
    let storage = Arc::new(RedisPushStorage::new(redis.clone()));
    let msg_reader = Arc::new(RedisMsgReader::new(redis.clone()));
    let online_pusher = Arc::new(GatewayOnlinePusher::new(&cfg.gateway));
    let callbacks = Arc::new(HttpCallbackBus::new(cfg.callback.clone())?);

    let offline_pusher: Option<Arc<dyn OfflinePusher>> = match cfg.fcm.as_ref() {
        Some(fcm_cfg) => Some(Arc::new(FcmPusher::new(fcm_cfg, redis.clone())?)),
        None => {
            tracing::warn!("no offline push provider configured; offline path disabled");
            None
        }
    };

    let pusher = Arc::new(Pusher::new(
        cfg.clone(),
        online_pusher,
        offline_pusher,
        storage,
        msg_reader,
        cache.clone(),
        cache.clone(),
        cache,
        callbacks,
    ));

    let consumer = PushConsumer::new(&cfg, pusher)?;
    tokio::spawn(async move {
        consumer.run().await;
    });

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting push-service");

    HttpServer::new(|| {
        App::new()
            .route("/metrics", web::get().to(metrics::metrics_handler))
            .route("/healthz", web::get().to(metrics::health_handler))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("http server: {e}")))
}
