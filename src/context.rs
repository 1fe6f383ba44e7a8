use std::time::{Duration, Instant};

use tokio::sync::watch;
use tonic::metadata::MetadataMap;

use crate::error::{AppError, AppResult};

pub const OPERATION_ID_HEADER: &str = "x-operation-id";
pub const OP_USER_ID_HEADER: &str = "x-op-user-id";
pub const CONN_ID_HEADER: &str = "x-conn-id";
pub const TRIGGER_ID_HEADER: &str = "x-trigger-id";
pub const OP_USER_PLATFORM_HEADER: &str = "x-op-user-platform";
pub const REMOTE_ADDR_HEADER: &str = "x-remote-addr";

/// Request-scoped identity, deadline and cancellation, carried explicitly
/// through the dispatch pipeline and propagated on every egress call.
///
/// Clones share the cancellation channel: cancelling any clone cancels
/// every suspension point guarded through [`RequestContext::run`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operation_id: String,
    pub op_user_id: String,
    pub conn_id: String,
    pub trigger_id: String,
    pub op_user_platform: String,
    pub remote_addr: String,
    deadline: Option<Instant>,
    cancel_tx: std::sync::Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Default for RequestContext {
    fn default() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            operation_id: String::new(),
            op_user_id: String::new(),
            conn_id: String::new(),
            trigger_id: String::new(),
            op_user_platform: String::new(),
            remote_addr: String::new(),
            deadline: None,
            cancel_tx: std::sync::Arc::new(cancel_tx),
            cancel_rx,
        }
    }
}

impl RequestContext {
    pub fn for_operation(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            ..Default::default()
        }
    }

    /// Stamps an absolute deadline `timeout` from now. Every call guarded
    /// through [`RequestContext::run`] fails with a cancellation error
    /// once the deadline passes.
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Guards one suspension point: races the call against cancellation
    /// and the request deadline. The losing call future is dropped, which
    /// aborts whatever I/O it had in flight.
    pub async fn run<T>(
        &self,
        fut: impl std::future::Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        if self.is_cancelled() {
            return Err(AppError::Cancelled("request cancelled".into()));
        }
        if let Some(deadline) = self.deadline {
            if deadline <= Instant::now() {
                return Err(AppError::Cancelled("request deadline exceeded".into()));
            }
        }
        let mut cancel_rx = self.cancel_rx.clone();
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = cancel_rx.wait_for(|cancelled| *cancelled) => {
                        Err(AppError::Cancelled("request cancelled".into()))
                    }
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        Err(AppError::Cancelled("request deadline exceeded".into()))
                    }
                    result = fut => result,
                }
            }
            None => {
                tokio::select! {
                    _ = cancel_rx.wait_for(|cancelled| *cancelled) => {
                        Err(AppError::Cancelled("request cancelled".into()))
                    }
                    result = fut => result,
                }
            }
        }
    }

    /// Copies the context fields into outgoing gRPC metadata. Fields that
    /// are empty or not valid header values are skipped rather than
    /// failing the call.
    pub fn inject(&self, metadata: &mut MetadataMap) {
        let fields = [
            (OPERATION_ID_HEADER, &self.operation_id),
            (OP_USER_ID_HEADER, &self.op_user_id),
            (CONN_ID_HEADER, &self.conn_id),
            (TRIGGER_ID_HEADER, &self.trigger_id),
            (OP_USER_PLATFORM_HEADER, &self.op_user_platform),
            (REMOTE_ADDR_HEADER, &self.remote_addr),
        ];
        for (key, value) in fields {
            if value.is_empty() {
                continue;
            }
            if let Ok(value) = value.parse() {
                metadata.insert(key, value);
            }
        }
    }
}
