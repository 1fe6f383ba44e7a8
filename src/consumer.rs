//! Kafka ingress.
//!
//! The send path publishes one `PushTask` per dispatch onto the push
//! topic; this consumer decodes it and drives the pusher. A task with a
//! group id takes the group fan-out path, otherwise the single-chat path.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::pb::MsgData;
use crate::services::pusher::Pusher;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushTask {
    pub operation_id: String,
    pub op_user_id: String,
    pub op_user_platform: String,
    pub conn_id: String,
    pub trigger_id: String,
    pub remote_addr: String,
    pub user_id: String,
    pub group_id: String,
    pub msg: MsgData,
}

impl PushTask {
    pub fn context(&self) -> RequestContext {
        let operation_id = if self.operation_id.is_empty() {
            Uuid::new_v4().simple().to_string()
        } else {
            self.operation_id.clone()
        };
        let mut ctx = RequestContext::for_operation(operation_id);
        ctx.op_user_id = self.op_user_id.clone();
        ctx.conn_id = self.conn_id.clone();
        ctx.trigger_id = self.trigger_id.clone();
        ctx.op_user_platform = self.op_user_platform.clone();
        ctx.remote_addr = self.remote_addr.clone();
        ctx
    }
}

pub struct PushConsumer {
    consumer: StreamConsumer,
    pusher: Arc<Pusher>,
    dispatch_timeout: Duration,
}

impl PushConsumer {
    pub fn new(cfg: &Config, pusher: Arc<Pusher>) -> AppResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &cfg.consumer_group)
            .set("bootstrap.servers", &cfg.kafka_brokers)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| AppError::Kafka(e.to_string()))?;

        consumer
            .subscribe(&[cfg.push_topic.as_str()])
            .map_err(|e| AppError::Kafka(e.to_string()))?;

        info!(topic = %cfg.push_topic, group = %cfg.consumer_group, "push consumer subscribed");
        Ok(Self {
            consumer,
            pusher,
            dispatch_timeout: Duration::from_millis(cfg.dispatch_timeout_ms),
        })
    }

    pub async fn run(&self) {
        loop {
            match self.consumer.recv().await {
                Err(e) => error!(error = %e, "kafka receive failed"),
                Ok(message) => {
                    let payload = match message.payload_view::<str>() {
                        Some(Ok(payload)) => payload,
                        Some(Err(e)) => {
                            warn!(error = %e, "push task payload is not utf-8, skipping");
                            continue;
                        }
                        None => continue,
                    };
                    self.handle(payload).await;
                }
            }
        }
    }

    async fn handle(&self, payload: &str) {
        let task: PushTask = match serde_json::from_str(payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "push task decode failed, skipping");
                return;
            }
        };

        // Every dispatch runs under a deadline; a stuck downstream call
        // surfaces as a cancellation error instead of wedging the consumer.
        let ctx = task.context().with_deadline(self.dispatch_timeout);
        let result = if !task.group_id.is_empty() {
            self.pusher
                .msg_to_super_group_user(&ctx, &task.group_id, task.msg)
                .await
        } else {
            self.pusher.msg_to_user(&ctx, &task.user_id, task.msg).await
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_policy_deny() => {
                info!(operation_id = %ctx.operation_id, deny = %e, "message denied by policy");
            }
            Err(e) if e.is_cancelled() => {
                warn!(operation_id = %ctx.operation_id, error = %e, "push dispatch cancelled");
            }
            Err(e) => {
                error!(operation_id = %ctx.operation_id, error = %e, "push dispatch failed");
            }
        }
    }
}
