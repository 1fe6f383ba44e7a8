//! Helpers for the per-message option map (string -> bool switches).

use std::collections::HashMap;

pub const IS_HISTORY: &str = "IsHistory";
pub const IS_PERSISTENT: &str = "IsPersistent";
pub const IS_SENDER_SYNC: &str = "IsSenderSync";
pub const IS_CONVERSATION_UPDATE: &str = "IsConversationUpdate";
pub const IS_SENDER_CONVERSATION_UPDATE: &str = "IsSenderConversationUpdate";
pub const IS_UNREAD_COUNT: &str = "IsUnreadCount";
pub const IS_OFFLINE_PUSH: &str = "IsOfflinePush";

/// An absent key means the switch is on.
pub fn is_enabled(options: &HashMap<String, bool>, key: &str) -> bool {
    options.get(key).copied().unwrap_or(true)
}

pub fn set_switch(options: &mut HashMap<String, bool>, key: &str, value: bool) {
    options.insert(key.to_string(), value);
}
