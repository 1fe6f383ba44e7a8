//! Narrow persistence ports used by the dispatch pipeline.
//!
//! `PushStorage` records call-invite metadata and gates the offline push
//! for signaling notifications; `MsgReader` resolves a super-group message
//! by sequence number for the revoke-rewrite check. Both sit behind traits
//! so the storage mechanism stays swappable.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::message::SignalContent;
use crate::pb::MsgData;

const SIGNAL_INVITE_KEY: &str = "signal_invite:";
const SUPER_GROUP_MSG_KEY: &str = "super_group_msg:";

const DEFAULT_INVITE_TTL_SECS: u64 = 86_400;

#[async_trait]
pub trait PushStorage: Send + Sync {
    /// Records invite metadata for a signaling message and decides whether
    /// the offline push should go out for this recipient. Must be called
    /// exactly once per recipient per delivery attempt, before the push.
    async fn handle_signal_invite(
        &self,
        ctx: &RequestContext,
        msg: &MsgData,
        push_to_user_id: &str,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait MsgReader: Send + Sync {
    async fn super_group_msg(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        seq: u32,
    ) -> AppResult<Option<MsgData>>;
}

#[derive(Clone)]
pub struct RedisPushStorage {
    redis: ConnectionManager,
}

impl RedisPushStorage {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl PushStorage for RedisPushStorage {
    async fn handle_signal_invite(
        &self,
        ctx: &RequestContext,
        msg: &MsgData,
        push_to_user_id: &str,
    ) -> AppResult<bool> {
        let signal: SignalContent = serde_json::from_slice(&msg.content)
            .map_err(|e| AppError::Storage(format!("decode signal content: {e}")))?;

        if !signal.kind.is_invite() {
            debug!(
                operation_id = %ctx.operation_id,
                user_id = %push_to_user_id,
                kind = ?signal.kind,
                "signal is not an invite, skipping offline push"
            );
            return Ok(false);
        }

        let ttl = if signal.timeout_secs > 0 {
            signal.timeout_secs
        } else {
            DEFAULT_INVITE_TTL_SECS
        };
        let key = format!("{SIGNAL_INVITE_KEY}{}:{push_to_user_id}", msg.client_msg_id);
        let payload = serde_json::to_string(&signal)
            .map_err(|e| AppError::Storage(format!("encode signal content: {e}")))?;

        let mut conn = self.redis.clone();
        let _: () = conn
            .set_ex(key, payload, ttl)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct RedisMsgReader {
    redis: ConnectionManager,
}

impl RedisMsgReader {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl MsgReader for RedisMsgReader {
    async fn super_group_msg(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
        seq: u32,
    ) -> AppResult<Option<MsgData>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn
            .get(format!("{SUPER_GROUP_MSG_KEY}{group_id}:{seq}"))
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        match raw {
            Some(raw) => {
                let msg = serde_json::from_str(&raw)
                    .map_err(|e| AppError::Storage(format!("decode cached message: {e}")))?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }
}
