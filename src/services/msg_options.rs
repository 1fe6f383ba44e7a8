//! Content-type-driven option normalization.
//!
//! Stamps the server message id and send timestamp, then forces the
//! delivery switches implied by the content type. Switches the table does
//! not mention keep whatever value the sender provided.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::content_type as ct;
use crate::models::options::{self, set_switch};
use crate::pb::MsgData;

pub fn encapsulate_msg_data(msg: &mut MsgData) {
    msg.server_msg_id = generate_msg_id(&msg.send_id);
    msg.send_time = Utc::now().timestamp_millis();
    apply_content_type_options(msg);
}

fn apply_content_type_options(msg: &mut MsgData) {
    let options = &mut msg.options;
    let content_type = msg.content_type;

    if ct::is_ordinary(content_type) {
        set_switch(options, options::IS_CONVERSATION_UPDATE, true);
        set_switch(options, options::IS_UNREAD_COUNT, true);
        set_switch(options, options::IS_SENDER_SYNC, true);
    } else if content_type == ct::REVOKE {
        set_switch(options, options::IS_UNREAD_COUNT, false);
        set_switch(options, options::IS_OFFLINE_PUSH, false);
    } else if ct::is_read_receipt(content_type) {
        set_switch(options, options::IS_CONVERSATION_UPDATE, false);
        set_switch(options, options::IS_SENDER_CONVERSATION_UPDATE, false);
        set_switch(options, options::IS_UNREAD_COUNT, false);
        set_switch(options, options::IS_OFFLINE_PUSH, false);
    } else if content_type == ct::TYPING {
        set_switch(options, options::IS_HISTORY, false);
        set_switch(options, options::IS_PERSISTENT, false);
        set_switch(options, options::IS_SENDER_SYNC, false);
        set_switch(options, options::IS_CONVERSATION_UPDATE, false);
        set_switch(options, options::IS_SENDER_CONVERSATION_UPDATE, false);
        set_switch(options, options::IS_UNREAD_COUNT, false);
        set_switch(options, options::IS_OFFLINE_PUSH, false);
    }
}

/// Server message ids hash the second-granularity wall clock, the sender
/// and a random integer, so concurrent sends by one user stay distinct.
pub fn generate_msg_id(send_id: &str) -> String {
    let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    let nonce: u64 = rand::random();
    let mut hasher = Sha256::new();
    hasher.update(format!("{stamp}-{send_id}-{nonce}"));
    hex::encode(hasher.finalize())
}
