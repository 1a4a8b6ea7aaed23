//! Session-identity capture and injection.
//!
//! The master assigns the framework its identity in the Subscribed event.
//! This stage captures it on the pull path and injects it into subsequently
//! pushed calls whose identity field is still unset. The initial Subscribe
//! passes through untouched — it legitimately carries no identity yet. A
//! later Subscribed overwrites the captured value: a new Subscribe always
//! starts a new session.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::flow::blueprint::StageFactory;
use crate::flow::{BoxFlow, Flow};
use crate::message::{CallKind, Event, FrameworkId, Message};

/// Captures the assigned [`FrameworkId`] and stamps it onto outgoing calls.
pub struct FrameworkIdStage {
    captured: Mutex<Option<FrameworkId>>,
    downstream: BoxFlow,
}

impl FrameworkIdStage {
    /// Wrap `downstream` with identity injection.
    #[must_use]
    pub fn new(downstream: BoxFlow) -> Self {
        Self {
            captured: Mutex::new(None),
            downstream,
        }
    }

    /// A factory for [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).
    #[must_use]
    pub fn factory() -> StageFactory {
        std::sync::Arc::new(|downstream| Box::new(FrameworkIdStage::new(downstream)) as BoxFlow)
    }
}

#[async_trait]
impl Flow for FrameworkIdStage {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        let message = match message {
            Message::Call(mut call) => {
                let inject = !matches!(call.kind, CallKind::Subscribe(_))
                    && call.framework_id.is_none();
                if inject {
                    // Nothing captured yet means the caller raced ahead of
                    // the subscription; forward unmodified.
                    call.framework_id = self.captured.lock().expect("captured lock").clone();
                }
                Message::Call(call)
            }
            other => other,
        };
        self.downstream.push(message, ctx).await
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        let message = self.downstream.pull(ctx).await?;
        if let Message::Event(Event::Subscribed(subscribed)) = &message {
            tracing::debug!(framework_id = %subscribed.framework_id, "captured session identity");
            *self.captured.lock().expect("captured lock") = Some(subscribed.framework_id.clone());
        }
        Ok(message)
    }

    fn close(&self) {
        self.downstream.close();
    }
}
