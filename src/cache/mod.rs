//! Read-only lookup ports consumed by the dispatch pipeline.
//!
//! The caches themselves are populated elsewhere; this service only reads
//! them. Each concern is a narrow trait so tests can substitute in-memory
//! fakes for the Redis-backed implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::AppResult;

pub mod redis_cache;

pub use redis_cache::RedisCache;

/// Per-user receive preference, both global and per-conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvMsgOpt {
    Receive,
    NotReceive,
    ReceiveNotNotify,
}

impl RecvMsgOpt {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RecvMsgOpt::Receive),
            1 => Some(RecvMsgOpt::NotReceive),
            2 => Some(RecvMsgOpt::ReceiveNotNotify),
            _ => None,
        }
    }
}

pub const ROLE_ORDINARY: i32 = 1;
pub const GROUP_STATUS_MUTED: i32 = 3;
pub const GROUP_TYPE_SUPER: i32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupMemberInfo {
    pub user_id: String,
    /// Anything above ordinary counts as admin.
    pub role_level: i32,
    /// Unix seconds; a member is muted while this lies in the future.
    pub mute_end_time: i64,
}

impl GroupMemberInfo {
    pub fn is_admin(&self) -> bool {
        self.role_level > ROLE_ORDINARY
    }

    pub fn is_muted_at(&self, now_secs: i64) -> bool {
        self.mute_end_time >= now_secs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: String,
    pub group_type: i32,
    pub status: i32,
}

impl GroupInfo {
    pub fn is_super(&self) -> bool {
        self.group_type == GROUP_TYPE_SUPER
    }

    pub fn is_muted(&self) -> bool {
        self.status == GROUP_STATUS_MUTED
    }
}

#[async_trait]
pub trait RelationCache: Send + Sync {
    async fn black_id_list(&self, user_id: &str) -> AppResult<Vec<String>>;
    async fn friend_id_list(&self, user_id: &str) -> AppResult<Vec<String>>;
}

#[async_trait]
pub trait GroupCache: Send + Sync {
    async fn member_ids(&self, ctx: &RequestContext, group_id: &str) -> AppResult<Vec<String>>;
    async fn member_info(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        user_id: &str,
    ) -> AppResult<GroupMemberInfo>;
    async fn group_info(&self, ctx: &RequestContext, group_id: &str) -> AppResult<GroupInfo>;
}

#[async_trait]
pub trait ConversationCache: Send + Sync {
    async fn global_recv_opt(&self, user_id: &str) -> AppResult<RecvMsgOpt>;
    /// `None` means the user never set a preference for this conversation.
    async fn conversation_recv_opt(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Option<RecvMsgOpt>>;
    async fn not_notify_user_ids(
        &self,
        ctx: &RequestContext,
        group_id: &str,
    ) -> AppResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_mute_window() {
        let member = GroupMemberInfo {
            user_id: "u1".into(),
            role_level: ROLE_ORDINARY,
            mute_end_time: 2_000,
        };
        assert!(member.is_muted_at(1_999));
        assert!(member.is_muted_at(2_000));
        assert!(!member.is_muted_at(2_001));
        assert!(!member.is_admin());
    }

    #[test]
    fn test_group_flags() {
        let group = GroupInfo {
            group_id: "g1".into(),
            group_type: GROUP_TYPE_SUPER,
            status: GROUP_STATUS_MUTED,
        };
        assert!(group.is_super());
        assert!(group.is_muted());
    }

    #[test]
    fn test_recv_opt_from_i32() {
        assert_eq!(RecvMsgOpt::from_i32(0), Some(RecvMsgOpt::Receive));
        assert_eq!(RecvMsgOpt::from_i32(1), Some(RecvMsgOpt::NotReceive));
        assert_eq!(RecvMsgOpt::from_i32(2), Some(RecvMsgOpt::ReceiveNotNotify));
        assert_eq!(RecvMsgOpt::from_i32(9), None);
    }
}
