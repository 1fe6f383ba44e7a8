//! Discovery and fan-out for the gateway fleet.
//!
//! The registry resolves the configured gateway service to a set of live
//! client handles. Connections are cached per endpoint and re-established
//! lazily; a replica that cannot be reached is skipped for this dispatch,
//! never fatal. Handles are borrowed per dispatch and must not be cached
//! by callers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tracing::warn;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::error::AppResult;
use crate::pb::msg_gateway_client::MsgGatewayClient;
use crate::pb::{MsgData, OnlineBatchPushOneMsgReq, SingleMsgToUserResultList};

pub struct GatewayConn {
    pub endpoint: String,
    pub client: MsgGatewayClient,
}

pub struct GatewayRegistry {
    service_name: String,
    endpoints: Vec<String>,
    connect_timeout: Duration,
    channels: RwLock<HashMap<String, Channel>>,
}

impl GatewayRegistry {
    pub fn new(cfg: &GatewayConfig) -> Self {
        Self {
            service_name: cfg.service_name.clone(),
            endpoints: cfg.endpoints.clone(),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Resolves the current set of live replica handles. May be empty when
    /// every replica is unreachable; the caller then treats all recipients
    /// as not delivered online.
    pub async fn conns(&self) -> Vec<GatewayConn> {
        let mut conns = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            match self.channel_for(endpoint).await {
                Ok(channel) => conns.push(GatewayConn {
                    endpoint: endpoint.clone(),
                    client: MsgGatewayClient::new(channel),
                }),
                Err(e) => {
                    warn!(
                        service = %self.service_name,
                        endpoint = %endpoint,
                        error = %e,
                        "gateway replica unreachable, skipping"
                    );
                }
            }
        }
        conns
    }

    async fn channel_for(&self, endpoint: &str) -> Result<Channel, tonic::transport::Error> {
        if let Some(channel) = self.channels.read().await.get(endpoint) {
            return Ok(channel.clone());
        }

        let channel = Endpoint::from_shared(endpoint.to_string())?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await?;

        self.channels
            .write()
            .await
            .insert(endpoint.to_string(), channel.clone());
        Ok(channel)
    }
}

/// Online delivery port: push one envelope to a recipient list and report
/// per-recipient, per-platform outcomes.
#[async_trait]
pub trait OnlinePusher: Send + Sync {
    async fn batch_push(
        &self,
        ctx: &RequestContext,
        msg: &MsgData,
        user_ids: &[String],
    ) -> AppResult<Vec<SingleMsgToUserResultList>>;
}

pub struct GatewayOnlinePusher {
    registry: GatewayRegistry,
    push_timeout: Duration,
}

impl GatewayOnlinePusher {
    pub fn new(cfg: &GatewayConfig) -> Self {
        Self {
            registry: GatewayRegistry::new(cfg),
            push_timeout: Duration::from_millis(cfg.push_timeout_ms),
        }
    }
}

#[async_trait]
impl OnlinePusher for GatewayOnlinePusher {
    async fn batch_push(
        &self,
        ctx: &RequestContext,
        msg: &MsgData,
        user_ids: &[String],
    ) -> AppResult<Vec<SingleMsgToUserResultList>> {
        let conns = self.registry.conns().await;
        if conns.is_empty() {
            warn!(
                operation_id = %ctx.operation_id,
                service = %self.registry.service_name(),
                "no live gateway replicas, recipients stay offline"
            );
            return Ok(Vec::new());
        }

        // Per-call deadline: the remaining request budget, capped by the
        // configured per-push timeout.
        let timeout = match ctx.remaining() {
            Some(remaining) => remaining.min(self.push_timeout),
            None => self.push_timeout,
        };

        let calls = conns.into_iter().map(|conn| {
            let body = OnlineBatchPushOneMsgReq {
                operation_id: ctx.operation_id.clone(),
                msg_data: Some(msg.clone()),
                push_to_user_id_list: user_ids.to_vec(),
            };
            let ctx = ctx.clone();
            async move {
                let mut client = conn.client;
                let mut request = tonic::Request::new(body);
                request.set_timeout(timeout);
                ctx.inject(request.metadata_mut());
                match client.super_group_online_batch_push_one_msg(request).await {
                    Ok(resp) => Some(resp.into_inner().single_push_result),
                    Err(status) => {
                        warn!(
                            operation_id = %ctx.operation_id,
                            endpoint = %conn.endpoint,
                            status = %status,
                            "gateway replica push failed, skipping"
                        );
                        None
                    }
                }
            }
        });

        let replies = futures::future::join_all(calls).await;
        Ok(replies.into_iter().flatten().flatten().collect())
    }
}
