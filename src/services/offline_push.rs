//! Offline push provider port and the FCM-backed implementation.
//!
//! Vendor specifics stay behind `OfflinePusher`; the dispatch pipeline
//! only hands over recipient ids, title, body and options.

use async_trait::async_trait;
use fcm::{Client, MessageBuilder, NotificationBuilder};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, error, warn};

use crate::config::FcmConfig;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};

use super::push_format::PushOpts;

const FCM_TOKEN_KEY: &str = "fcm_token:";

#[async_trait]
pub trait OfflinePusher: Send + Sync {
    async fn push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        title: &str,
        body: &str,
        opts: &PushOpts,
    ) -> AppResult<()>;
}

/// Firebase Cloud Messaging provider. Device tokens are resolved from the
/// token registry maintained by the device-registration flow; each token
/// gets its own send.
pub struct FcmPusher {
    api_key: String,
    client: Client,
    redis: ConnectionManager,
}

fn badge_value(count: i32) -> Option<String> {
    (count > 0).then(|| count.to_string())
}

impl FcmPusher {
    pub fn new(cfg: &FcmConfig, redis: ConnectionManager) -> AppResult<Self> {
        Ok(Self {
            api_key: cfg.api_key.clone(),
            client: Client::new(),
            redis,
        })
    }

    async fn device_tokens(&self, user_ids: &[String]) -> AppResult<Vec<String>> {
        let mut conn = self.redis.clone();
        let mut tokens = Vec::new();
        for user_id in user_ids {
            let user_tokens: Vec<String> = conn
                .smembers(format!("{FCM_TOKEN_KEY}{user_id}"))
                .await
                .map_err(|e| AppError::OfflinePush(format!("token lookup: {e}")))?;
            tokens.extend(user_tokens);
        }
        Ok(tokens)
    }

    async fn send_to_token(
        &self,
        ctx: &RequestContext,
        device_token: &str,
        title: &str,
        body: &str,
        opts: &PushOpts,
    ) -> Result<(), String> {
        let mut notification_builder = NotificationBuilder::new();
        notification_builder.title(title).body(body);

        let sound = if opts.ios_push_sound.is_empty() {
            "default"
        } else {
            &opts.ios_push_sound
        };
        notification_builder.sound(sound);

        // Store badge string to extend lifetime past the builder.
        let badge_str = badge_value(opts.ios_badge_count);
        if let Some(ref badge) = badge_str {
            notification_builder.badge(badge);
        }

        let notification = notification_builder.finalize();

        let mut message_builder = MessageBuilder::new(&self.api_key, device_token);
        message_builder.notification(notification);
        let message = message_builder.finalize();

        // Log only a token prefix for privacy.
        let token_prefix: String = device_token.chars().take(8).collect();
        match self.client.send(message).await {
            Ok(response) => {
                debug!(
                    operation_id = %ctx.operation_id,
                    token_prefix = %token_prefix,
                    message_id = ?response.message_id,
                    "fcm notification sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    operation_id = %ctx.operation_id,
                    token_prefix = %token_prefix,
                    error = %e,
                    "fcm send failed"
                );
                Err(e.to_string())
            }
        }
    }
}

#[async_trait]
impl OfflinePusher for FcmPusher {
    async fn push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        title: &str,
        body: &str,
        opts: &PushOpts,
    ) -> AppResult<()> {
        let tokens = self.device_tokens(user_ids).await?;
        if tokens.is_empty() {
            debug!(
                operation_id = %ctx.operation_id,
                user_count = user_ids.len(),
                "no registered device tokens, nothing to push"
            );
            return Ok(());
        }

        let mut success_count = 0usize;
        let mut failure_count = 0usize;
        let mut last_error = String::new();
        for token in &tokens {
            match self.send_to_token(ctx, token, title, body, opts).await {
                Ok(()) => success_count += 1,
                Err(e) => {
                    failure_count += 1;
                    last_error = e;
                }
            }
        }

        if success_count == 0 && failure_count > 0 {
            return Err(AppError::OfflinePush(format!(
                "all {failure_count} fcm sends failed: {last_error}"
            )));
        }
        if failure_count > 0 {
            warn!(
                operation_id = %ctx.operation_id,
                success_count,
                failure_count,
                "fcm batch partially failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_only_when_positive() {
        assert_eq!(badge_value(3), Some("3".to_string()));
        assert_eq!(badge_value(0), None);
        assert_eq!(badge_value(-1), None);
    }
}
