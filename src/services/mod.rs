pub mod callback;
pub mod msg_options;
pub mod offline_push;
pub mod push_format;
pub mod pusher;
pub mod recv_opt;
pub mod validation;
