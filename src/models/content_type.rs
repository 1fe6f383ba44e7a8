//! Content-type taxonomy.
//!
//! Codes are partitioned into disjoint bands: ordinary chat content
//! (101..=114, minus the control kinds inside it), read receipts, a
//! notification band (1000..=1999), and the signaling sub-band used for
//! call invites. Mixed deployments rely on these exact values.

pub const TEXT: i32 = 101;
pub const PICTURE: i32 = 102;
pub const VOICE: i32 = 103;
pub const VIDEO: i32 = 104;
pub const FILE: i32 = 105;
pub const AT_TEXT: i32 = 106;
pub const MERGE: i32 = 107;
pub const CARD: i32 = 108;
pub const LOCATION: i32 = 109;
pub const CUSTOM: i32 = 110;
pub const REVOKE: i32 = 111;
pub const HAS_READ_RECEIPT: i32 = 112;
pub const TYPING: i32 = 113;
pub const QUOTE: i32 = 114;
pub const GROUP_HAS_READ_RECEIPT: i32 = 116;
pub const ADVANCED_REVOKE: i32 = 118;

pub const NOTIFICATION_BEGIN: i32 = 1000;
pub const NOTIFICATION_END: i32 = 1999;

pub const SIGNALING_NOTIFICATION_BEGIN: i32 = 1600;
pub const SIGNALING_NOTIFICATION: i32 = 1601;
pub const SIGNALING_NOTIFICATION_END: i32 = 1699;

/// Ordinary user-visible chat content: text through quote, excluding the
/// control kinds (revoke, read receipt, typing) that share the band.
pub fn is_ordinary(content_type: i32) -> bool {
    matches!(
        content_type,
        TEXT | PICTURE | VOICE | VIDEO | FILE | AT_TEXT | MERGE | CARD | LOCATION | CUSTOM | QUOTE
    )
}

pub fn is_read_receipt(content_type: i32) -> bool {
    content_type == HAS_READ_RECEIPT || content_type == GROUP_HAS_READ_RECEIPT
}

pub fn is_notification(content_type: i32) -> bool {
    (NOTIFICATION_BEGIN..=NOTIFICATION_END).contains(&content_type)
}

pub fn is_signaling(content_type: i32) -> bool {
    content_type > SIGNALING_NOTIFICATION_BEGIN && content_type < SIGNALING_NOTIFICATION_END
}
