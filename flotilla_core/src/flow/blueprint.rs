//! Ordered, immutable descriptions of stage chains.
//!
//! A [`Blueprint`] records stage constructors without building anything;
//! [`materialize`](Blueprint::materialize) wraps a root flow with one fresh,
//! independent stage chain per call. Re-materializing is how the session
//! loop reconnects: no stage state survives from one pipeline to the next.

use std::sync::Arc;

use super::BoxFlow;

/// Builds one stage instance around its downstream flow.
pub type StageFactory = Arc<dyn Fn(BoxFlow) -> BoxFlow + Send + Sync>;

/// Accumulates stage factories in call order.
///
/// The first appended stage ends up outermost, closest to the application:
/// pushed calls pass through stages in append order before reaching the
/// root, and pulled events pass through in reverse append order before
/// reaching the caller.
#[derive(Default)]
pub struct BlueprintBuilder {
    stages: Vec<StageFactory>,
}

impl BlueprintBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage factory.
    #[must_use]
    pub fn append(mut self, factory: StageFactory) -> Self {
        self.stages.push(factory);
        self
    }

    /// Freeze the accumulated factories into a [`Blueprint`].
    #[must_use]
    pub fn build(self) -> Blueprint {
        Blueprint {
            stages: self.stages.into(),
        }
    }
}

/// An immutable, ordered description of a stage chain.
#[derive(Clone)]
pub struct Blueprint {
    stages: Arc<[StageFactory]>,
}

impl Blueprint {
    /// Build a live pipeline around `root`.
    ///
    /// The root is wrapped successively so that the first appended stage is
    /// outermost. Each call produces a fresh, independent pipeline.
    #[must_use]
    pub fn materialize(&self, root: BoxFlow) -> BoxFlow {
        self.stages
            .iter()
            .rev()
            .fold(root, |downstream, factory| (factory.as_ref())(downstream))
    }

    /// Number of configured stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the blueprint holds no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::FlowError;
    use crate::flow::Flow;
    use crate::message::{Call, CallKind, Event, Message, TaskId};

    /// Tags pushed kill calls and pulled failure events with its label so
    /// traversal order becomes observable.
    struct TaggingStage {
        label: &'static str,
        downstream: BoxFlow,
    }

    #[async_trait]
    impl Flow for TaggingStage {
        async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
            let message = match message {
                Message::Call(mut call) => {
                    if let CallKind::Kill(kill) = &mut call.kind {
                        kill.task_id =
                            TaskId::new(format!("{}{}", kill.task_id.as_str(), self.label));
                    }
                    Message::Call(call)
                }
                other => other,
            };
            self.downstream.push(message, ctx).await
        }

        async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
            let message = self.downstream.pull(ctx).await?;
            Ok(match message {
                Message::Event(Event::Failure(mut failure)) => {
                    let tagged = format!("{}{}", failure.message.unwrap_or_default(), self.label);
                    failure.message = Some(tagged);
                    Message::Event(Event::Failure(failure))
                }
                other => other,
            })
        }

        fn close(&self) {
            self.downstream.close();
        }
    }

    fn tagging(label: &'static str) -> StageFactory {
        Arc::new(move |downstream| Box::new(TaggingStage { label, downstream }) as BoxFlow)
    }

    #[tokio::test]
    async fn first_appended_stage_is_outermost() {
        let blueprint = BlueprintBuilder::new()
            .append(tagging("a"))
            .append(tagging("b"))
            .append(tagging("c"))
            .build();
        assert_eq!(blueprint.len(), 3);

        let (root, remote) = crate::flow::channel::pair();
        let pipeline = blueprint.materialize(Box::new(root));
        let ctx = CancellationToken::new();

        // Push traverses a -> b -> c -> root.
        pipeline
            .push(Call::kill(TaskId::from("t-"), None).into(), &ctx)
            .await
            .expect("push");
        let pushed = remote.recv().await.expect("pushed call");
        match pushed {
            Message::Call(call) => match call.kind {
                CallKind::Kill(kill) => assert_eq!(kill.task_id.as_str(), "t-abc"),
                other => panic!("unexpected call {}", other.name()),
            },
            other => panic!("unexpected message {other:?}"),
        }

        // Pull traverses root -> c -> b -> a.
        remote
            .send(Message::Event(Event::Failure(crate::message::Failure {
                agent_id: None,
                message: Some(String::new()),
            })))
            .await
            .expect("inject");
        let pulled = pipeline.pull(&ctx).await.expect("pull");
        match pulled {
            Message::Event(Event::Failure(failure)) => {
                assert_eq!(failure.message.as_deref(), Some("cba"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn materialize_builds_independent_pipelines() {
        let blueprint = BlueprintBuilder::new().append(tagging("x")).build();

        let (root_a, _remote_a) = crate::flow::channel::pair();
        let (root_b, remote_b) = crate::flow::channel::pair();
        let first = blueprint.materialize(Box::new(root_a));
        let second = blueprint.materialize(Box::new(root_b));
        let ctx = CancellationToken::new();

        // Closing the first pipeline must not affect the second.
        first.close();
        second
            .push(Call::revive().into(), &ctx)
            .await
            .expect("second pipeline still open");
        assert!(remote_b.recv().await.is_some());
    }
}
