//! Per-recipient receive-preference resolution.
//!
//! The global preference is read first; the per-conversation preference
//! overrides it when set. Read receipts are always delivered regardless of
//! a NotReceive preference. Preference-store failures other than
//! "not found" fail open: the recipient keeps the message. Cancellation
//! is the one exception and surfaces as an error.
//!
//! The resolver mutates only the per-recipient envelope copy handed to it
//! by the fan-out planner; the shared envelope is never touched.

use tracing::warn;

use crate::cache::{ConversationCache, RecvMsgOpt};
use crate::context::RequestContext;
use crate::error::AppResult;
use crate::models::content_type;
use crate::models::message::{conversation_id, SessionType};
use crate::models::options::{self, set_switch};
use crate::pb::MsgData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvDecision {
    Deliver,
    Drop,
}

pub async fn resolve(
    cache: &dyn ConversationCache,
    ctx: &RequestContext,
    user_id: &str,
    source_id: &str,
    session_type: SessionType,
    msg: &mut MsgData,
) -> AppResult<RecvDecision> {
    let global = match ctx.run(cache.global_recv_opt(user_id)).await {
        Ok(opt) => opt,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            warn!(
                operation_id = %ctx.operation_id,
                user_id = %user_id,
                error = %e,
                "global receive option lookup failed, delivering"
            );
            return Ok(RecvDecision::Deliver);
        }
    };

    match global {
        RecvMsgOpt::Receive => {}
        RecvMsgOpt::NotReceive => {
            if content_type::is_read_receipt(msg.content_type) {
                return Ok(RecvDecision::Deliver);
            }
            return Ok(RecvDecision::Drop);
        }
        RecvMsgOpt::ReceiveNotNotify => {
            set_switch(&mut msg.options, options::IS_OFFLINE_PUSH, false);
            return Ok(RecvDecision::Deliver);
        }
    }

    let conversation_id = conversation_id(source_id, session_type);
    let single = match ctx
        .run(cache.conversation_recv_opt(user_id, &conversation_id))
        .await
    {
        Ok(opt) => opt,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            warn!(
                operation_id = %ctx.operation_id,
                user_id = %user_id,
                conversation_id = %conversation_id,
                error = %e,
                "conversation receive option lookup failed, delivering"
            );
            return Ok(RecvDecision::Deliver);
        }
    };

    let decision = match single {
        None | Some(RecvMsgOpt::Receive) => RecvDecision::Deliver,
        Some(RecvMsgOpt::NotReceive) => {
            if content_type::is_read_receipt(msg.content_type) {
                RecvDecision::Deliver
            } else {
                RecvDecision::Drop
            }
        }
        Some(RecvMsgOpt::ReceiveNotNotify) => {
            set_switch(&mut msg.options, options::IS_OFFLINE_PUSH, false);
            RecvDecision::Deliver
        }
    };
    Ok(decision)
}
