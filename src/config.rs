use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Logical name of the gateway service; used for log attribution and
    /// as the registry key when a dynamic resolver is plugged in.
    pub service_name: String,
    pub endpoints: Vec<String>,
    pub connect_timeout_ms: u64,
    pub push_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Base URL of the webhook receiver. Unset disables all hook points.
    pub url: Option<String>,
    pub timeout_ms: u64,
    /// When true, a transport-level webhook failure is logged and treated
    /// as "continue"; when false it aborts the send.
    pub failed_continue: bool,
}

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka_brokers: String,
    pub push_topic: String,
    pub consumer_group: String,
    /// Deadline stamped on each dispatch's request context.
    pub dispatch_timeout_ms: u64,
    pub redis_url: String,
    pub port: u16,
    /// Application managers bypass membership and mute checks.
    pub manager_user_ids: Vec<String>,
    pub friend_verify: bool,
    pub gateway: GatewayConfig,
    pub callback: CallbackConfig,
    pub fcm: Option<FcmConfig>,
}

impl Config {
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn env_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let kafka_brokers = env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".into());
        let push_topic = env::var("PUSH_TOPIC").unwrap_or_else(|_| "msg_push".into());
        let consumer_group =
            env::var("PUSH_CONSUMER_GROUP").unwrap_or_else(|_| "push-service".into());
        let dispatch_timeout_ms = Self::env_u64("PUSH_DISPATCH_TIMEOUT_MS", 10_000);
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let manager_user_ids = env::var("MANAGER_USER_IDS")
            .map(|v| Self::parse_list(&v))
            .unwrap_or_default();
        let friend_verify = env::var("FRIEND_VERIFY")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let endpoints = env::var("MSG_GATEWAY_ENDPOINTS")
            .map(|v| Self::parse_list(&v))
            .unwrap_or_default();
        if endpoints.is_empty() {
            return Err(AppError::Config("MSG_GATEWAY_ENDPOINTS missing".into()));
        }
        let gateway = GatewayConfig {
            service_name: env::var("MSG_GATEWAY_SERVICE").unwrap_or_else(|_| "msg-gateway".into()),
            endpoints,
            connect_timeout_ms: Self::env_u64("MSG_GATEWAY_CONNECT_TIMEOUT_MS", 3000),
            push_timeout_ms: Self::env_u64("MSG_GATEWAY_PUSH_TIMEOUT_MS", 3000),
        };

        let callback = CallbackConfig {
            url: env::var("CALLBACK_URL").ok().filter(|v| !v.trim().is_empty()),
            timeout_ms: Self::env_u64("CALLBACK_TIMEOUT_MS", 5000),
            failed_continue: env::var("CALLBACK_FAILED_CONTINUE")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        };

        let fcm = match env::var("FCM_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => Some(FcmConfig { api_key }),
            _ => None,
        };

        Ok(Self {
            kafka_brokers,
            push_topic,
            consumer_group,
            dispatch_timeout_ms,
            redis_url,
            port,
            manager_user_ids,
            friend_verify,
            gateway,
            callback,
            fcm,
        })
    }

    pub fn is_manager(&self, user_id: &str) -> bool {
        self.manager_user_ids.iter().any(|id| id == user_id)
    }

    pub fn test_defaults() -> Self {
        Self {
            kafka_brokers: "localhost:9092".into(),
            push_topic: "msg_push".into(),
            consumer_group: "push-service".into(),
            dispatch_timeout_ms: 10_000,
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 3000,
            manager_user_ids: vec!["im_admin".into()],
            friend_verify: false,
            gateway: GatewayConfig {
                service_name: "msg-gateway".into(),
                endpoints: vec!["http://127.0.0.1:50051".into()],
                connect_timeout_ms: 1000,
                push_timeout_ms: 1000,
            },
            callback: CallbackConfig {
                url: None,
                timeout_ms: 1000,
                failed_continue: true,
            },
            fcm: None,
        }
    }
}
