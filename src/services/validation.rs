//! Send-time policy checks.
//!
//! Produces a `Verdict` per message: `Allow` with the authoritative member
//! list for group-typed sessions, or `Deny` with a protocol code. Relation
//! cache failures on the single-chat path are soft: logged and treated as
//! permissive. Group membership is hard-required.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{GroupCache, RelationCache};
use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{deny, AppResult};
use crate::models::content_type as ct;
use crate::models::message::SessionType;
use crate::pb::MsgData;
use crate::storage::MsgReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow { member_list: Vec<String> },
    Deny { code: i32, reason: String },
}

impl Verdict {
    fn allow() -> Self {
        Verdict::Allow {
            member_list: Vec::new(),
        }
    }

    fn allow_with(member_list: Vec<String>) -> Self {
        Verdict::Allow { member_list }
    }

    fn deny(code: i32, reason: impl Into<String>) -> Self {
        Verdict::Deny {
            code,
            reason: reason.into(),
        }
    }
}

/// Revoke payload carried in an advanced-revoke envelope. When a user
/// other than the original sender revokes, the `source_message_*` fields
/// are rewritten from the canonical stored message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageRevoked {
    pub revoker_id: String,
    pub revoker_role: i32,
    pub client_msg_id: String,
    pub revoker_nickname: String,
    pub revoke_time: i64,
    pub source_message_send_time: i64,
    pub source_message_send_id: String,
    pub source_message_sender_nickname: String,
    pub session_type: i32,
    pub seq: u32,
}

pub struct Validator {
    config: Arc<Config>,
    relation_cache: Arc<dyn RelationCache>,
    group_cache: Arc<dyn GroupCache>,
    msg_reader: Arc<dyn MsgReader>,
}

impl Validator {
    pub fn new(
        config: Arc<Config>,
        relation_cache: Arc<dyn RelationCache>,
        group_cache: Arc<dyn GroupCache>,
        msg_reader: Arc<dyn MsgReader>,
    ) -> Self {
        Self {
            config,
            relation_cache,
            group_cache,
            msg_reader,
        }
    }

    /// Validates one envelope. May rewrite the envelope content for
    /// advanced revokes, which is why the message is taken mutably.
    pub async fn verify(&self, ctx: &RequestContext, msg: &mut MsgData) -> AppResult<Verdict> {
        match SessionType::from_i32(msg.session_type) {
            Some(SessionType::Single) => self.verify_single(ctx, msg).await,
            Some(SessionType::Group) => {
                let group_id = msg.group_id.clone();
                self.verify_group(ctx, msg, &group_id).await
            }
            Some(SessionType::SuperGroup) => self.verify_super_group(ctx, msg).await,
            _ => Ok(Verdict::allow()),
        }
    }

    async fn verify_single(&self, ctx: &RequestContext, msg: &MsgData) -> AppResult<Verdict> {
        if self.config.is_manager(&msg.send_id) {
            return Ok(Verdict::allow());
        }
        if ct::is_notification(msg.content_type) {
            return Ok(Verdict::allow());
        }

        match ctx.run(self.relation_cache.black_id_list(&msg.recv_id)).await {
            Ok(black_list) => {
                if black_list.iter().any(|id| id == &msg.send_id) {
                    return Ok(Verdict::deny(deny::BLOCKLISTED, "in black list"));
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    operation_id = %ctx.operation_id,
                    recv_id = %msg.recv_id,
                    error = %e,
                    "blocklist lookup failed, allowing"
                );
            }
        }

        if self.config.friend_verify {
            match ctx.run(self.relation_cache.friend_id_list(&msg.recv_id)).await {
                Ok(friend_list) => {
                    if !friend_list.iter().any(|id| id == &msg.send_id) {
                        return Ok(Verdict::deny(deny::NOT_FRIEND, "not friend"));
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(
                        operation_id = %ctx.operation_id,
                        recv_id = %msg.recv_id,
                        error = %e,
                        "friendlist lookup failed, allowing"
                    );
                }
            }
        }

        Ok(Verdict::allow())
    }

    async fn verify_group(
        &self,
        ctx: &RequestContext,
        msg: &MsgData,
        group_id: &str,
    ) -> AppResult<Verdict> {
        let member_list = match ctx.run(self.group_cache.member_ids(ctx, group_id)).await {
            Ok(members) => members,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Ok(Verdict::deny(deny::INTERNAL, e.to_string())),
        };

        if self.config.is_manager(&msg.send_id) {
            return Ok(Verdict::allow_with(member_list));
        }
        if ct::is_notification(msg.content_type) {
            return Ok(Verdict::allow_with(member_list));
        }
        if !member_list.iter().any(|id| id == &msg.send_id) {
            return Ok(Verdict::deny(deny::NOT_IN_GROUP, "you are not in group"));
        }

        let member = match ctx
            .run(self.group_cache.member_info(ctx, group_id, &msg.send_id))
            .await
        {
            Ok(member) => member,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Ok(Verdict::deny(deny::MUTE_LOOKUP, e.to_string())),
        };
        if member.is_muted_at(Utc::now().timestamp()) && !member.is_admin() {
            return Ok(Verdict::deny(deny::USER_MUTED, "you are muted"));
        }
        if member.is_admin() {
            return Ok(Verdict::allow_with(member_list));
        }

        let group = match ctx.run(self.group_cache.group_info(ctx, group_id)).await {
            Ok(group) => group,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Ok(Verdict::deny(deny::MUTE_LOOKUP, e.to_string())),
        };
        if group.is_muted() {
            return Ok(Verdict::deny(deny::GROUP_MUTED, "group id muted"));
        }

        Ok(Verdict::allow_with(member_list))
    }

    async fn verify_super_group(
        &self,
        ctx: &RequestContext,
        msg: &mut MsgData,
    ) -> AppResult<Verdict> {
        let group_id = msg.group_id.clone();
        let group = match ctx.run(self.group_cache.group_info(ctx, &group_id)).await {
            Ok(group) => group,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Ok(Verdict::deny(deny::INTERNAL, e.to_string())),
        };

        if msg.content_type == ct::ADVANCED_REVOKE {
            if let Some(verdict) = self.rewrite_revoke(ctx, msg, &group_id).await? {
                return Ok(verdict);
            }
        }

        if group.is_super() {
            // Membership is not enumerated for super groups; fan-out
            // expands it downstream by group id.
            return Ok(Verdict::allow());
        }

        self.verify_group(ctx, msg, &group_id).await
    }

    /// Returns `Ok(Some(deny))` when the revoke must be rejected and
    /// `Ok(None)` when processing continues (possibly with rewritten
    /// content); only cancellation surfaces as `Err`.
    async fn rewrite_revoke(
        &self,
        ctx: &RequestContext,
        msg: &mut MsgData,
        group_id: &str,
    ) -> AppResult<Option<Verdict>> {
        let mut revoke: MessageRevoked = match serde_json::from_slice(&msg.content) {
            Ok(revoke) => revoke,
            Err(e) => {
                warn!(
                    operation_id = %ctx.operation_id,
                    group_id = %group_id,
                    error = %e,
                    "revoke payload decode failed"
                );
                return Ok(Some(Verdict::deny(deny::INTERNAL, e.to_string())));
            }
        };

        if revoke.revoker_id == revoke.source_message_send_id {
            return Ok(None);
        }

        // Someone else (an admin) is revoking: resolve the canonical
        // message and rewrite the source fields from it.
        match ctx
            .run(self.msg_reader.super_group_msg(ctx, group_id, revoke.seq))
            .await
        {
            Ok(Some(original)) => {
                if original.client_msg_id == revoke.client_msg_id && original.seq == revoke.seq {
                    revoke.source_message_send_time = original.send_time;
                    revoke.source_message_sender_nickname = original.sender_nickname;
                    revoke.source_message_send_id = original.send_id;
                    debug!(
                        operation_id = %ctx.operation_id,
                        group_id = %group_id,
                        seq = revoke.seq,
                        "rewrote revoke source fields from canonical message"
                    );
                    match serde_json::to_vec(&revoke) {
                        Ok(content) => {
                            msg.content = content;
                            Ok(None)
                        }
                        Err(e) => Ok(Some(Verdict::deny(deny::INTERNAL, e.to_string()))),
                    }
                } else {
                    Ok(Some(Verdict::deny(deny::INTERNAL, "msg err")))
                }
            }
            Err(e) if e.is_cancelled() => Err(e),
            Ok(None) | Err(_) => {
                // Lookup failures keep the client-supplied payload; only a
                // fetched mismatch denies.
                warn!(
                    operation_id = %ctx.operation_id,
                    group_id = %group_id,
                    seq = revoke.seq,
                    "canonical message lookup failed, keeping client payload"
                );
                Ok(None)
            }
        }
    }
}
