//! Dispatch orchestration.
//!
//! One envelope enters through `msg_to_user` (single chat) or
//! `msg_to_super_group_user` (group-typed sessions) and flows through
//! validation, option normalization, per-recipient preference resolution,
//! online fan-out across the gateway fleet, and finally the offline push
//! path for recipients no replica could reach.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{ConversationCache, GroupCache, RelationCache};
use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::gateway::OnlinePusher;
use crate::metrics;
use crate::models::content_type as ct;
use crate::models::message::SessionType;
use crate::models::options::{self, is_enabled};
use crate::models::platform;
use crate::pb::{MsgData, SingleMsgToUserResultList};
use crate::storage::{MsgReader, PushStorage};

use super::callback::CallbackBus;
use super::msg_options::encapsulate_msg_data;
use super::offline_push::OfflinePusher;
use super::push_format::offline_push_infos;
use super::recv_opt::{self, RecvDecision};
use super::validation::{Validator, Verdict};

pub struct Pusher {
    validator: Validator,
    online_pusher: Arc<dyn OnlinePusher>,
    offline_pusher: Option<Arc<dyn OfflinePusher>>,
    storage: Arc<dyn PushStorage>,
    group_cache: Arc<dyn GroupCache>,
    conversation_cache: Arc<dyn ConversationCache>,
    callbacks: Arc<dyn CallbackBus>,
}

impl Pusher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        online_pusher: Arc<dyn OnlinePusher>,
        offline_pusher: Option<Arc<dyn OfflinePusher>>,
        storage: Arc<dyn PushStorage>,
        msg_reader: Arc<dyn MsgReader>,
        relation_cache: Arc<dyn RelationCache>,
        group_cache: Arc<dyn GroupCache>,
        conversation_cache: Arc<dyn ConversationCache>,
        callbacks: Arc<dyn CallbackBus>,
    ) -> Self {
        let validator = Validator::new(config, relation_cache, group_cache.clone(), msg_reader);
        Self {
            validator,
            online_pusher,
            offline_pusher,
            storage,
            group_cache,
            conversation_cache,
            callbacks,
        }
    }

    /// Dispatches a single-chat envelope to one recipient.
    pub async fn msg_to_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        mut msg: MsgData,
    ) -> AppResult<()> {
        if let Verdict::Deny { code, reason } = self.validator.verify(ctx, &mut msg).await? {
            return Err(AppError::deny(code, reason));
        }
        encapsulate_msg_data(&mut msg);

        // The recipient works on its own envelope copy; preference
        // resolution must never leak into the shared message.
        let mut per_recipient = msg.clone();
        let decision = recv_opt::resolve(
            self.conversation_cache.as_ref(),
            ctx,
            user_id,
            &msg.send_id,
            SessionType::Single,
            &mut per_recipient,
        )
        .await?;
        if decision == RecvDecision::Drop {
            debug!(
                operation_id = %ctx.operation_id,
                user_id = %user_id,
                "recipient opted out, dropping"
            );
            return Ok(());
        }

        let user_ids = vec![user_id.to_string()];
        ctx.run(self.callbacks.on_online_push(ctx, &user_ids, &per_recipient))
            .await?;

        let results = ctx
            .run(self.online_pusher.batch_push(ctx, &per_recipient, &user_ids))
            .await?;
        metrics::MSG_DISPATCH_SUCCESS.inc();
        info!(
            operation_id = %ctx.operation_id,
            user_id = %user_id,
            online = results.iter().any(|r| r.online_push),
            "single push dispatched"
        );

        let offline_wanted = is_enabled(&per_recipient.options, options::IS_OFFLINE_PUSH);
        if !offline_wanted || user_id == per_recipient.send_id {
            return Ok(());
        }
        if results.iter().any(|r| r.online_push) {
            return Ok(());
        }

        if per_recipient.content_type == ct::SIGNALING_NOTIFICATION {
            let should_send = ctx
                .run(self.storage.handle_signal_invite(ctx, &per_recipient, user_id))
                .await?;
            if !should_send {
                return Ok(());
            }
        }

        let offline_ids = match ctx
            .run(self.callbacks.before_offline_push(ctx, &user_ids, &per_recipient))
            .await?
        {
            Some(replacement) => replacement,
            None => user_ids,
        };
        self.offline_push(ctx, user_id, &per_recipient, &offline_ids)
            .await
    }

    /// Dispatches a group-typed envelope: classic groups use the validated
    /// member list, super groups expand membership through the group cache.
    pub async fn msg_to_super_group_user(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        mut msg: MsgData,
    ) -> AppResult<()> {
        let verdict = self.validator.verify(ctx, &mut msg).await?;
        let member_list = match verdict {
            Verdict::Deny { code, reason } => return Err(AppError::deny(code, reason)),
            Verdict::Allow { member_list } => member_list,
        };
        encapsulate_msg_data(&mut msg);

        let mut recipients = ctx
            .run(self.callbacks.before_super_group_online_push(ctx, group_id, &msg))
            .await?
            .unwrap_or_default();
        if recipients.is_empty() {
            recipients = if member_list.is_empty() {
                ctx.run(self.group_cache.member_ids(ctx, group_id)).await?
            } else {
                member_list
            };
        }

        // Fan-out planning: every kept recipient owns a full envelope copy.
        let session_type =
            SessionType::from_i32(msg.session_type).unwrap_or(SessionType::SuperGroup);
        let mut kept: Vec<(String, MsgData)> = Vec::with_capacity(recipients.len());
        for user_id in &recipients {
            let mut per_recipient = msg.clone();
            let decision = recv_opt::resolve(
                self.conversation_cache.as_ref(),
                ctx,
                user_id,
                group_id,
                session_type,
                &mut per_recipient,
            )
            .await?;
            if decision == RecvDecision::Deliver {
                kept.push((user_id.clone(), per_recipient));
            }
        }
        if kept.is_empty() {
            debug!(
                operation_id = %ctx.operation_id,
                group_id = %group_id,
                "every recipient opted out, dropping"
            );
            return Ok(());
        }

        let results = self.dispatch_grouped(ctx, &kept).await?;
        metrics::MSG_DISPATCH_SUCCESS.inc();
        info!(
            operation_id = %ctx.operation_id,
            group_id = %group_id,
            recipients = kept.len(),
            online = results.iter().filter(|r| r.online_push).count(),
            "super group push dispatched"
        );

        if !is_enabled(&msg.options, options::IS_OFFLINE_PUSH) {
            return Ok(());
        }

        // The sender never offline-pushes themselves.
        let mut online_set: HashSet<String> = HashSet::new();
        online_set.insert(msg.send_id.clone());
        let mut background_web_pc: HashSet<String> = HashSet::new();
        for result in &results {
            if result.online_push {
                if result.user_id != msg.send_id {
                    online_set.insert(result.user_id.clone());
                }
            } else {
                let suspended = result.resp.iter().any(|r| {
                    r.result_code == platform::RESULT_CODE_BACKGROUND
                        && platform::is_web_or_pc_terminal(r.recv_platform_id)
                });
                if suspended {
                    background_web_pc.insert(result.user_id.clone());
                }
            }
        }

        // Recipients silenced per-conversation never reach the offline path.
        let mut offline_set: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for (user_id, per_recipient) in &kept {
            if !seen.insert(user_id.as_str()) {
                continue;
            }
            if online_set.contains(user_id) {
                continue;
            }
            if !is_enabled(&per_recipient.options, options::IS_OFFLINE_PUSH) {
                continue;
            }
            offline_set.push(user_id.clone());
        }

        if msg.content_type != ct::SIGNALING_NOTIFICATION {
            match ctx
                .run(self.conversation_cache.not_notify_user_ids(ctx, group_id))
                .await
            {
                Ok(muted) => {
                    let muted: HashSet<String> = muted.into_iter().collect();
                    offline_set.retain(|user_id| !muted.contains(user_id));
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(
                        operation_id = %ctx.operation_id,
                        group_id = %group_id,
                        error = %e,
                        "do-not-notify lookup failed, keeping offline set"
                    );
                }
            }
        }

        if offline_set.is_empty() {
            return Ok(());
        }

        if let Some(replacement) = ctx
            .run(self.callbacks.before_offline_push(ctx, &offline_set, &msg))
            .await?
        {
            offline_set = replacement;
        }

        self.offline_push(ctx, group_id, &msg, &offline_set).await?;

        // Wake suspended web/desktop clients that just got an offline
        // notification so the open tab catches up too.
        let wake_ids: Vec<String> = offline_set
            .iter()
            .filter(|user_id| background_web_pc.contains(*user_id))
            .cloned()
            .collect();
        if !wake_ids.is_empty() {
            debug!(
                operation_id = %ctx.operation_id,
                group_id = %group_id,
                wake = wake_ids.len(),
                "re-dispatching online wake to suspended web/pc clients"
            );
            ctx.run(self.online_pusher.batch_push(ctx, &msg, &wake_ids))
                .await?;
        }

        Ok(())
    }

    /// Batches the online RPC per distinct option map so no recipient's
    /// resolved switches leak to another while the gateway still sees one
    /// call per group of identical envelopes.
    async fn dispatch_grouped(
        &self,
        ctx: &RequestContext,
        kept: &[(String, MsgData)],
    ) -> AppResult<Vec<SingleMsgToUserResultList>> {
        let mut groups: HashMap<BTreeMap<String, bool>, (MsgData, Vec<String>)> = HashMap::new();
        for (user_id, per_recipient) in kept {
            let key: BTreeMap<String, bool> = per_recipient
                .options
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            groups
                .entry(key)
                .or_insert_with(|| (per_recipient.clone(), Vec::new()))
                .1
                .push(user_id.clone());
        }

        let mut results = Vec::new();
        for (envelope, user_ids) in groups.into_values() {
            let mut batch = ctx
                .run(self.online_pusher.batch_push(ctx, &envelope, &user_ids))
                .await?;
            results.append(&mut batch);
        }
        Ok(results)
    }

    async fn offline_push(
        &self,
        ctx: &RequestContext,
        source_id: &str,
        msg: &MsgData,
        user_ids: &[String],
    ) -> AppResult<()> {
        let pusher = self
            .offline_pusher
            .as_ref()
            .ok_or(AppError::OfflinePusherUnconfigured)?;

        let (title, body, opts) = offline_push_infos(source_id, msg)?;
        match ctx
            .run(pusher.push(ctx, user_ids, &title, &body, &opts))
            .await
        {
            Ok(()) => {
                metrics::MSG_OFFLINE_PUSH_SUCCESS.inc();
                info!(
                    operation_id = %ctx.operation_id,
                    source_id = %source_id,
                    user_count = user_ids.len(),
                    "offline push sent"
                );
                Ok(())
            }
            // A cancelled push is neither a provider success nor failure.
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                metrics::MSG_OFFLINE_PUSH_FAILED.inc();
                warn!(
                    operation_id = %ctx.operation_id,
                    source_id = %source_id,
                    error = %e,
                    "offline push failed"
                );
                Err(e)
            }
        }
    }
}
