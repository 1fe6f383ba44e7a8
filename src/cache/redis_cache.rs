use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};

use super::{ConversationCache, GroupCache, GroupInfo, GroupMemberInfo, RecvMsgOpt, RelationCache};

const BLACK_LIST_KEY: &str = "black_list:";
const FRIEND_LIST_KEY: &str = "friend_list:";
const GROUP_MEMBER_IDS_KEY: &str = "group_member_ids:";
const GROUP_MEMBER_INFO_KEY: &str = "group_member_info:";
const GROUP_INFO_KEY: &str = "group_info:";
const RECV_NOT_NOTIFY_KEY: &str = "super_group_recv_msg_not_notify:";
const GLOBAL_RECV_OPT_KEY: &str = "user_global_recv_msg_opt:";
const CONVERSATION_RECV_OPT_KEY: &str = "conversation_recv_msg_opt:";

/// Redis-backed view over the relation, group and conversation caches
/// maintained by the upstream services.
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    async fn set_members(&self, key: String) -> AppResult<Vec<String>> {
        let mut conn = self.redis.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn json_value<T: serde::de::DeserializeOwned>(
        &self,
        key: String,
        what: &str,
    ) -> AppResult<T> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(&key).await?;
        let raw = raw.ok_or_else(|| AppError::Cache(format!("{what} not cached: {key}")))?;
        serde_json::from_str(&raw).map_err(|e| AppError::Cache(format!("decode {what}: {e}")))
    }
}

#[async_trait]
impl RelationCache for RedisCache {
    async fn black_id_list(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.set_members(format!("{BLACK_LIST_KEY}{user_id}")).await
    }

    async fn friend_id_list(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.set_members(format!("{FRIEND_LIST_KEY}{user_id}")).await
    }
}

#[async_trait]
impl GroupCache for RedisCache {
    async fn member_ids(&self, _ctx: &RequestContext, group_id: &str) -> AppResult<Vec<String>> {
        self.set_members(format!("{GROUP_MEMBER_IDS_KEY}{group_id}"))
            .await
    }

    async fn member_info(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
        user_id: &str,
    ) -> AppResult<GroupMemberInfo> {
        self.json_value(
            format!("{GROUP_MEMBER_INFO_KEY}{group_id}:{user_id}"),
            "group member",
        )
        .await
    }

    async fn group_info(&self, _ctx: &RequestContext, group_id: &str) -> AppResult<GroupInfo> {
        self.json_value(format!("{GROUP_INFO_KEY}{group_id}"), "group")
            .await
    }
}

#[async_trait]
impl ConversationCache for RedisCache {
    async fn global_recv_opt(&self, user_id: &str) -> AppResult<RecvMsgOpt> {
        let mut conn = self.redis.clone();
        let raw: Option<i32> = conn.get(format!("{GLOBAL_RECV_OPT_KEY}{user_id}")).await?;
        // An unset global preference means "receive".
        Ok(raw
            .and_then(RecvMsgOpt::from_i32)
            .unwrap_or(RecvMsgOpt::Receive))
    }

    async fn conversation_recv_opt(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Option<RecvMsgOpt>> {
        let mut conn = self.redis.clone();
        let raw: Option<i32> = conn
            .get(format!(
                "{CONVERSATION_RECV_OPT_KEY}{user_id}:{conversation_id}"
            ))
            .await?;
        Ok(raw.and_then(RecvMsgOpt::from_i32))
    }

    async fn not_notify_user_ids(
        &self,
        _ctx: &RequestContext,
        group_id: &str,
    ) -> AppResult<Vec<String>> {
        self.set_members(format!("{RECV_NOT_NOTIFY_KEY}{group_id}"))
            .await
    }
}
