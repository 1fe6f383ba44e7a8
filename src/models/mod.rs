pub mod content_type;
pub mod message;
pub mod options;
pub mod platform;
