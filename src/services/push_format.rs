//! Title/body/option derivation for offline notifications.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::content_type as ct;
use crate::models::message::SignalContent;
use crate::pb::MsgData;

pub const PUSH_CONTENT_TEXT: &str = "[Text]";
pub const PUSH_CONTENT_PICTURE: &str = "[Picture]";
pub const PUSH_CONTENT_VOICE: &str = "[Voice]";
pub const PUSH_CONTENT_VIDEO: &str = "[Video]";
pub const PUSH_CONTENT_FILE: &str = "[File]";
pub const PUSH_CONTENT_AT: &str = "[@You] ";
pub const PUSH_CONTENT_GROUP_MSG: &str = "You have a new group message";
pub const PUSH_CONTENT_SIGNAL: &str = "You have a new call invitation";
pub const PUSH_CONTENT_COMMON: &str = "You have a new message";

/// Provider-facing options attached to an offline notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOpts {
    pub ios_badge_count: i32,
    pub ios_push_sound: String,
    pub ex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalOpts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalOpts {
    pub client_msg_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AtContent {
    text: String,
    at_user_list: Vec<String>,
    is_at_self: bool,
}

/// Resolves `(title, body, opts)` for the offline provider. The effective
/// title is always non-empty: a missing title falls back to the
/// content-type display table, then to the common default, and an empty
/// body mirrors the title.
pub fn offline_push_infos(source_id: &str, msg: &MsgData) -> AppResult<(String, String, PushOpts)> {
    let opts = offline_push_opts(msg)?;

    let (mut title, mut body) = match &msg.offline_push_info {
        Some(info) => (info.title.clone(), info.desc.clone()),
        None => (String::new(), String::new()),
    };

    if title.is_empty() {
        title = derived_title(source_id, msg);
    }
    if title.is_empty() {
        title = PUSH_CONTENT_COMMON.to_string();
    }
    if body.is_empty() {
        body = title.clone();
    }

    Ok((title, body, opts))
}

fn derived_title(source_id: &str, msg: &MsgData) -> String {
    match msg.content_type {
        ct::TEXT => PUSH_CONTENT_TEXT.to_string(),
        ct::PICTURE => PUSH_CONTENT_PICTURE.to_string(),
        ct::VOICE => PUSH_CONTENT_VOICE.to_string(),
        ct::VIDEO => PUSH_CONTENT_VIDEO.to_string(),
        ct::FILE => PUSH_CONTENT_FILE.to_string(),
        ct::AT_TEXT => {
            // Malformed at-content falls back to the group default.
            let at: AtContent = serde_json::from_slice(&msg.content).unwrap_or_default();
            if at.at_user_list.iter().any(|id| id == source_id) {
                format!("{PUSH_CONTENT_AT}{PUSH_CONTENT_COMMON}")
            } else {
                PUSH_CONTENT_GROUP_MSG.to_string()
            }
        }
        ct::SIGNALING_NOTIFICATION => PUSH_CONTENT_SIGNAL.to_string(),
        _ => PUSH_CONTENT_COMMON.to_string(),
    }
}

fn offline_push_opts(msg: &MsgData) -> AppResult<PushOpts> {
    let mut opts = PushOpts::default();

    if ct::is_signaling(msg.content_type) {
        let signal: SignalContent = serde_json::from_slice(&msg.content)
            .map_err(|e| AppError::BadMessage(format!("decode signal content: {e}")))?;
        if signal.kind.is_invite() {
            opts.signal = Some(SignalOpts {
                client_msg_id: msg.client_msg_id.clone(),
            });
        }
    }

    if let Some(info) = &msg.offline_push_info {
        opts.ios_badge_count = info.ios_badge_count;
        opts.ios_push_sound = info.ios_push_sound.clone();
        opts.ex = info.ex.clone();
    }

    Ok(opts)
}
