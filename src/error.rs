use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Deny codes returned to the sending client when a message fails
/// send-time policy. The numeric values are part of the client protocol.
pub mod deny {
    pub const INTERNAL: i32 = 201;
    pub const NOT_IN_GROUP: i32 = 202;
    pub const MUTE_LOOKUP: i32 = 223;
    pub const USER_MUTED: i32 = 224;
    pub const GROUP_MUTED: i32 = 225;
    pub const BLOCKLISTED: i32 = 600;
    pub const NOT_FRIEND: i32 = 601;
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("policy denied ({code}): {reason}")]
    Policy { code: i32, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("cache lookup failed: {0}")]
    Cache(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("gateway dispatch failed: {0}")]
    Gateway(String),

    #[error("callback rejected: {0}")]
    CallbackAbort(String),

    #[error("no offline pusher is configured")]
    OfflinePusherUnconfigured,

    #[error("offline push failed: {0}")]
    OfflinePush(String),

    #[error("kafka error: {0}")]
    Kafka(String),

    #[error("invalid message: {0}")]
    BadMessage(String),

    #[error("{0}")]
    Cancelled(String),
}

impl AppError {
    pub fn deny(code: i32, reason: impl Into<String>) -> Self {
        AppError::Policy {
            code,
            reason: reason.into(),
        }
    }

    /// A deny decision is a protocol answer, not a fault: callers log it
    /// at a lower severity and forward the code to the client.
    pub fn is_policy_deny(&self) -> bool {
        matches!(self, AppError::Policy { .. })
    }

    /// Cancellation and deadline expiry always propagate to the caller;
    /// soft-fail lookup paths must never swallow them as permissive.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled(_))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::BadMessage(e.to_string())
    }
}
