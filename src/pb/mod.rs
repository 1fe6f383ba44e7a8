//! Wire types for the msg-gateway RPC contract.
//!
//! These mirror `proto/msg_gateway.proto` field-for-field. They are kept as
//! hand-maintained prost derives instead of `tonic_build` output so the
//! crate builds without a `protoc` toolchain; the serde derives give the
//! same structs a JSON form for the Kafka ingress and Redis fixtures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfflinePushInfo {
    #[prost(string, tag = "1")]
    pub title: String,
    #[prost(string, tag = "2")]
    pub desc: String,
    #[prost(string, tag = "3")]
    pub ex: String,
    #[prost(string, tag = "4")]
    pub ios_push_sound: String,
    #[prost(int32, tag = "5")]
    pub ios_badge_count: i32,
}

/// The message envelope as it travels from the send path, through this
/// service, to the gateway fleet. Created upstream, flows through the
/// dispatch pipeline exactly once, then persisted by the storage tier.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MsgData {
    #[prost(string, tag = "1")]
    pub server_msg_id: String,
    #[prost(string, tag = "2")]
    pub client_msg_id: String,
    #[prost(string, tag = "3")]
    pub send_id: String,
    #[prost(string, tag = "4")]
    pub recv_id: String,
    #[prost(string, tag = "5")]
    pub group_id: String,
    #[prost(string, tag = "6")]
    pub sender_nickname: String,
    #[prost(int32, tag = "7")]
    pub sender_platform_id: i32,
    #[prost(int32, tag = "8")]
    pub session_type: i32,
    #[prost(int32, tag = "9")]
    pub content_type: i32,
    #[prost(bytes = "vec", tag = "10")]
    pub content: Vec<u8>,
    #[prost(int64, tag = "11")]
    pub send_time: i64,
    #[prost(int64, tag = "12")]
    pub create_time: i64,
    #[prost(uint32, tag = "13")]
    pub seq: u32,
    /// Per-message delivery switches. Treated as copy-on-write: fan-out
    /// clones the whole envelope per recipient before touching this map.
    #[prost(map = "string, bool", tag = "14")]
    pub options: HashMap<String, bool>,
    #[prost(message, optional, tag = "15")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OnlineBatchPushOneMsgReq {
    #[prost(string, tag = "1")]
    pub operation_id: String,
    #[prost(message, optional, tag = "2")]
    pub msg_data: Option<MsgData>,
    #[prost(string, repeated, tag = "3")]
    pub push_to_user_id_list: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SingleMsgToUserPlatform {
    #[prost(int32, tag = "1")]
    pub recv_platform_id: i32,
    #[prost(int64, tag = "2")]
    pub result_code: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SingleMsgToUserResultList {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(message, repeated, tag = "2")]
    pub resp: Vec<SingleMsgToUserPlatform>,
    #[prost(bool, tag = "3")]
    pub online_push: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OnlineBatchPushOneMsgResp {
    #[prost(message, repeated, tag = "1")]
    pub single_push_result: Vec<SingleMsgToUserResultList>,
}

pub mod msg_gateway_client {
    use tonic::codegen::http::uri::PathAndQuery;

    use super::{OnlineBatchPushOneMsgReq, OnlineBatchPushOneMsgResp};

    const BATCH_PUSH_PATH: &str = "/msggateway.MsgGateway/SuperGroupOnlineBatchPushOneMsg";

    /// Unary client for one gateway replica, borrowed from the registry
    /// for the duration of a single dispatch.
    #[derive(Debug, Clone)]
    pub struct MsgGatewayClient {
        inner: tonic::client::Grpc<tonic::transport::Channel>,
    }

    impl MsgGatewayClient {
        pub fn new(channel: tonic::transport::Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        pub async fn super_group_online_batch_push_one_msg(
            &mut self,
            request: tonic::Request<OnlineBatchPushOneMsgReq>,
        ) -> Result<tonic::Response<OnlineBatchPushOneMsgResp>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("gateway channel not ready: {e}"))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            self.inner
                .unary(request, PathAndQuery::from_static(BATCH_PUSH_PATH), codec)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_data_json_round_trip() {
        let mut msg = MsgData {
            client_msg_id: "c1".into(),
            send_id: "u1".into(),
            recv_id: "u2".into(),
            session_type: 1,
            content_type: 101,
            content: b"hi".to_vec(),
            ..Default::default()
        };
        msg.options.insert("IsOfflinePush".into(), true);

        let json = serde_json::to_string(&msg).unwrap();
        let back: MsgData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_msg_data_json_defaults_missing_fields() {
        let back: MsgData = serde_json::from_str(r#"{"sendId":"u1"}"#).unwrap();
        assert_eq!(back.send_id, "u1");
        assert!(back.options.is_empty());
        assert!(back.offline_push_info.is_none());
    }
}
