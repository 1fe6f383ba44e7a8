use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Opts, TextEncoder};

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .unwrap_or_else(|_| panic!("failed to create {name}"));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|_| panic!("failed to register {name}"));
    counter
}

pub static MSG_DISPATCH_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "push_service_msg_dispatch_success_total",
        "Messages that completed the online dispatch stage",
    )
});

pub static MSG_OFFLINE_PUSH_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "push_service_msg_offline_push_success_total",
        "Offline push batches accepted by the provider",
    )
});

pub static MSG_OFFLINE_PUSH_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "push_service_msg_offline_push_failed_total",
        "Offline push batches rejected by the provider",
    )
});

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
