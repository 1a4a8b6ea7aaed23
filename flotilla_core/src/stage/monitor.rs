//! Observability stage.
//!
//! Counts messages by direction and variant, and errors by direction,
//! through [`crate::metrics::record`]. Messages and errors are forwarded
//! bit-for-bit — this stage never alters, suppresses, or delays anything.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::flow::blueprint::StageFactory;
use crate::flow::{BoxFlow, Flow};
use crate::message::Message;
use crate::metrics::record;

/// Pure pass-through with counters.
pub struct MonitorStage {
    downstream: BoxFlow,
}

impl MonitorStage {
    /// Wrap `downstream` with counters.
    #[must_use]
    pub fn new(downstream: BoxFlow) -> Self {
        Self { downstream }
    }

    /// A factory for [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).
    #[must_use]
    pub fn factory() -> StageFactory {
        std::sync::Arc::new(|downstream| Box::new(MonitorStage::new(downstream)) as BoxFlow)
    }
}

#[async_trait]
impl Flow for MonitorStage {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        if let Message::Call(call) = &message {
            record::call_pushed(call.kind.name());
        }
        let result = self.downstream.push(message, ctx).await;
        if result.is_err() {
            record::flow_error("push");
        }
        result
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        match self.downstream.pull(ctx).await {
            Ok(message) => {
                if let Message::Event(event) = &message {
                    record::event_pulled(event.name());
                }
                Ok(message)
            }
            Err(error) => {
                record::flow_error("pull");
                if error == FlowError::DeadlineExceeded {
                    record::heartbeat_timeout();
                }
                Err(error)
            }
        }
    }

    fn close(&self) {
        self.downstream.close();
    }
}
