use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Single,
    Group,
    SuperGroup,
    Notification,
}

pub const SINGLE_CHAT: i32 = 1;
pub const GROUP_CHAT: i32 = 2;
pub const SUPER_GROUP_CHAT: i32 = 3;
pub const NOTIFICATION_CHAT: i32 = 4;

impl SessionType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            SINGLE_CHAT => Some(SessionType::Single),
            GROUP_CHAT => Some(SessionType::Group),
            SUPER_GROUP_CHAT => Some(SessionType::SuperGroup),
            NOTIFICATION_CHAT => Some(SessionType::Notification),
            _ => None,
        }
    }
}

/// Conversation ids are derived, not stored: the peer or group id prefixed
/// by the session kind. Both ends of a conversation derive the same id for
/// the same source.
pub fn conversation_id(source_id: &str, session_type: SessionType) -> String {
    match session_type {
        SessionType::Single => format!("single_{source_id}"),
        SessionType::Group => format!("group_{source_id}"),
        SessionType::SuperGroup => format!("super_group_{source_id}"),
        SessionType::Notification => format!("notification_{source_id}"),
    }
}

/// Control-plane signaling payload carried as JSON in the envelope content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalContent {
    pub kind: SignalKind,
    #[serde(default)]
    pub inviter_id: String,
    #[serde(default)]
    pub invitee_ids: Vec<String>,
    #[serde(default)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Invite,
    InviteInGroup,
    Accept,
    Reject,
    Cancel,
    HungUp,
}

impl SignalKind {
    /// Invites are the only sub-kind that records metadata and tags the
    /// offline notification with the originating client message id.
    pub fn is_invite(self) -> bool {
        matches!(self, SignalKind::Invite | SignalKind::InviteInGroup)
    }
}
