//! Webhook hook points around the dispatch pipeline.
//!
//! Three hooks fire: before super-group online fan-out (may override the
//! recipient list), on single-chat online push (advisory), and before
//! offline push (may rewrite the recipient list). A webhook answering
//! with the continue action acknowledges and lets the send proceed; a
//! forbid action or a business error aborts it. Transport failures follow
//! the configured fail-open policy. With no URL configured every hook is
//! a no-op.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CallbackConfig;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::pb::MsgData;

pub const CALLBACK_COMMAND_SUPER_GROUP_ONLINE_PUSH_BEFORE: &str = "superGroupOnlinePushBefore";
pub const CALLBACK_COMMAND_ONLINE_PUSH: &str = "onlinePush";
pub const CALLBACK_COMMAND_OFFLINE_PUSH_BEFORE: &str = "offlinePushBefore";

pub const ACTION_CONTINUE: i32 = 0;
pub const ACTION_FORBIDDEN: i32 = 1;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackReq<'a> {
    callback_command: &'static str,
    operation_id: &'a str,
    send_id: &'a str,
    group_id: &'a str,
    content_type: i32,
    session_type: i32,
    user_id_list: &'a [String],
    #[serde(with = "serde_bytes_as_b64")]
    content: &'a [u8],
}

// Raw content bytes travel base64-encoded in the webhook JSON.
mod serde_bytes_as_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CallbackResp {
    err_code: i32,
    err_msg: String,
    action_code: i32,
    user_id_list: Vec<String>,
}

#[async_trait]
pub trait CallbackBus: Send + Sync {
    /// May return a replacement recipient list for super-group fan-out.
    async fn before_super_group_online_push(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>>;

    /// Advisory single-chat hook; an abort answer drops the message.
    async fn on_online_push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        msg: &MsgData,
    ) -> AppResult<()>;

    /// May return a replacement recipient list for offline push.
    async fn before_offline_push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>>;
}

pub struct HttpCallbackBus {
    config: CallbackConfig,
    http: reqwest::Client,
}

impl HttpCallbackBus {
    pub fn new(config: CallbackConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Config(format!("callback http client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Posts one hook invocation. `Ok(None)` means "continue unchanged",
    /// `Ok(Some(list))` carries a recipient override.
    async fn post(
        &self,
        command: &'static str,
        ctx: &RequestContext,
        group_id: &str,
        user_ids: &[String],
        msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>> {
        let Some(base_url) = self.config.url.as_deref() else {
            return Ok(None);
        };

        let req = CallbackReq {
            callback_command: command,
            operation_id: &ctx.operation_id,
            send_id: &msg.send_id,
            group_id,
            content_type: msg.content_type,
            session_type: msg.session_type,
            user_id_list: user_ids,
            content: &msg.content,
        };

        let url = format!("{}/{command}", base_url.trim_end_matches('/'));
        let response = match self.http.post(&url).json(&req).send().await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(command, ctx, e.to_string()),
        };
        if !response.status().is_success() {
            let status = response.status();
            return self.transport_failure(command, ctx, format!("http status {status}"));
        }
        let resp: CallbackResp = match response.json().await {
            Ok(resp) => resp,
            Err(e) => return self.transport_failure(command, ctx, e.to_string()),
        };

        if resp.err_code != 0 || resp.action_code == ACTION_FORBIDDEN {
            return Err(AppError::CallbackAbort(format!(
                "{command}: code={} msg={}",
                resp.err_code, resp.err_msg
            )));
        }
        if resp.user_id_list.is_empty() {
            Ok(None)
        } else {
            Ok(Some(resp.user_id_list))
        }
    }

    fn transport_failure(
        &self,
        command: &str,
        ctx: &RequestContext,
        error: String,
    ) -> AppResult<Option<Vec<String>>> {
        if self.config.failed_continue {
            warn!(
                operation_id = %ctx.operation_id,
                command = %command,
                error = %error,
                "callback webhook failed, continuing"
            );
            Ok(None)
        } else {
            Err(AppError::CallbackAbort(format!("{command}: {error}")))
        }
    }
}

#[async_trait]
impl CallbackBus for HttpCallbackBus {
    async fn before_super_group_online_push(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>> {
        self.post(
            CALLBACK_COMMAND_SUPER_GROUP_ONLINE_PUSH_BEFORE,
            ctx,
            group_id,
            &[],
            msg,
        )
        .await
    }

    async fn on_online_push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        msg: &MsgData,
    ) -> AppResult<()> {
        self.post(CALLBACK_COMMAND_ONLINE_PUSH, ctx, "", user_ids, msg)
            .await
            .map(|_| ())
    }

    async fn before_offline_push(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        msg: &MsgData,
    ) -> AppResult<Option<Vec<String>>> {
        self.post(CALLBACK_COMMAND_OFFLINE_PUSH_BEFORE, ctx, "", user_ids, msg)
            .await
    }
}
