//! Auto-acknowledgment of status updates.
//!
//! Update events whose status carries an acknowledgment token require an
//! explicit Acknowledge call back to the master. This stage issues that call
//! on the caller's behalf — after the event has been delivered: the
//! acknowledgment is queued when the Update passes through and flushed at
//! the start of the next operation, so a crash between delivery and flush
//! re-delivers rather than drops. A flush failure is a downstream transport
//! error and surfaces from that next operation.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::FlowError;
use crate::flow::blueprint::StageFactory;
use crate::flow::{BoxFlow, Flow};
use crate::message::{Call, Event, Message};

/// Acknowledges ack-bearing Update events, at most once per token.
pub struct AckStage {
    pending: Mutex<VecDeque<Call>>,
    acked: Mutex<HashSet<Uuid>>,
    downstream: BoxFlow,
}

impl AckStage {
    /// Wrap `downstream` with auto-acknowledgment.
    #[must_use]
    pub fn new(downstream: BoxFlow) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            acked: Mutex::new(HashSet::new()),
            downstream,
        }
    }

    /// A factory for [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).
    #[must_use]
    pub fn factory() -> StageFactory {
        std::sync::Arc::new(|downstream| Box::new(AckStage::new(downstream)) as BoxFlow)
    }

    async fn flush(&self, ctx: &CancellationToken) -> Result<(), FlowError> {
        loop {
            let next = self.pending.lock().expect("pending lock").pop_front();
            let Some(call) = next else { return Ok(()) };
            tracing::debug!(call = call.kind.name(), "flushing acknowledgment");
            self.downstream.push(call.into(), ctx).await?;
        }
    }

    fn observe(&self, message: &Message) {
        let Message::Event(Event::Update(update)) = message else {
            return;
        };
        let Some(token) = update.status.ack_token else {
            return;
        };
        // Re-delivery of an already-acknowledged status must not produce a
        // second Acknowledge.
        if !self.acked.lock().expect("acked lock").insert(token) {
            return;
        }
        let ack = Call::acknowledge(
            update.status.agent_id.clone(),
            update.status.task_id.clone(),
            token,
        );
        self.pending.lock().expect("pending lock").push_back(ack);
    }
}

#[async_trait]
impl Flow for AckStage {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        self.flush(ctx).await?;
        self.downstream.push(message, ctx).await
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        self.flush(ctx).await?;
        let message = self.downstream.pull(ctx).await?;
        self.observe(&message);
        Ok(message)
    }

    fn close(&self) {
        self.downstream.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::flow::test_utils::ScriptedFlow;
    use crate::message::{AgentId, CallKind, TaskId, TaskState, TaskStatus, Update};

    fn update(token: Option<Uuid>) -> Message {
        Message::Event(Event::Update(Update {
            status: TaskStatus {
                task_id: TaskId::from("t1"),
                agent_id: AgentId::from("a1"),
                state: TaskState::Running,
                message: None,
                ack_token: token,
            },
        }))
    }

    fn stage_over_script() -> (Arc<ScriptedFlow>, AckStage) {
        let script = Arc::new(ScriptedFlow::new());
        let downstream: BoxFlow = Box::new(ScriptedShare(script.clone()));
        (script, AckStage::new(downstream))
    }

    /// Shares a ScriptedFlow so the test keeps a handle to the downstream
    /// the stage owns.
    struct ScriptedShare(Arc<ScriptedFlow>);

    #[async_trait]
    impl Flow for ScriptedShare {
        async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
            self.0.push(message, ctx).await
        }

        async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
            self.0.pull(ctx).await
        }

        fn close(&self) {
            self.0.close();
        }
    }

    #[tokio::test]
    async fn acknowledges_after_delivery_on_next_operation() {
        let (script, stage) = stage_over_script();
        let token = Uuid::new_v4();
        script.enqueue_pull(Ok(update(Some(token))));
        script.enqueue_pull(Ok(Event::Heartbeat.into()));
        let ctx = CancellationToken::new();

        // Delivery itself pushes nothing downstream yet.
        stage.pull(&ctx).await.expect("update delivered");
        assert!(script.pushed().is_empty());

        // The next operation flushes exactly one matching Acknowledge.
        stage.pull(&ctx).await.expect("heartbeat");
        let pushed = script.pushed();
        assert_eq!(pushed.len(), 1);
        match &pushed[0] {
            Message::Call(call) => match &call.kind {
                CallKind::Acknowledge(ack) => {
                    assert_eq!(ack.token, token);
                    assert_eq!(ack.task_id, TaskId::from("t1"));
                    assert_eq!(ack.agent_id, AgentId::from("a1"));
                }
                other => panic!("unexpected call {}", other.name()),
            },
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn redelivered_update_is_acked_once() {
        let (script, stage) = stage_over_script();
        let token = Uuid::new_v4();
        script.enqueue_pull(Ok(update(Some(token))));
        script.enqueue_pull(Ok(update(Some(token))));
        script.enqueue_pull(Ok(Event::Heartbeat.into()));
        let ctx = CancellationToken::new();

        stage.pull(&ctx).await.expect("first delivery");
        stage.pull(&ctx).await.expect("second delivery");
        stage.pull(&ctx).await.expect("heartbeat");

        let acks = script
            .pushed()
            .into_iter()
            .filter(|m| {
                matches!(
                    m,
                    Message::Call(Call {
                        kind: CallKind::Acknowledge(_),
                        ..
                    })
                )
            })
            .count();
        assert_eq!(acks, 1);
    }

    #[tokio::test]
    async fn update_without_token_passes_silently() {
        let (script, stage) = stage_over_script();
        script.enqueue_pull(Ok(update(None)));
        script.enqueue_pull(Ok(Event::Heartbeat.into()));
        let ctx = CancellationToken::new();

        stage.pull(&ctx).await.expect("update");
        stage.pull(&ctx).await.expect("heartbeat");
        assert!(script.pushed().is_empty());
    }

    #[tokio::test]
    async fn flush_failure_surfaces_on_next_operation() {
        let (script, stage) = stage_over_script();
        script.enqueue_pull(Ok(update(Some(Uuid::new_v4()))));
        let ctx = CancellationToken::new();

        stage.pull(&ctx).await.expect("update delivered");
        script.fail_next_push(FlowError::Transport("gone".into()));

        assert_eq!(
            stage.push(Call::revive().into(), &ctx).await,
            Err(FlowError::Transport("gone".into()))
        );
        // The caller's own revive never reached downstream.
        assert!(script.pushed().is_empty());
    }
}
