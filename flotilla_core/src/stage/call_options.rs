//! Static call options merged into outgoing calls.
//!
//! A [`CallOption`] is a pure transform over an outgoing [`Call`]. The stage
//! applies its configured options, in order, to every pushed call; options
//! must only fill fields the caller left unset. The pull path is untouched.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::flow::blueprint::StageFactory;
use crate::flow::{BoxFlow, Flow};
use crate::message::{Call, CallKind, Filters, Message};

/// A transform applied to every outgoing call.
pub type CallOption = Arc<dyn Fn(&mut Call) + Send + Sync>;

/// Fill in `filters` on Accept and Decline calls that carry none.
///
/// Caller-supplied filters are never overwritten.
#[must_use]
pub fn default_filters(filters: Filters) -> CallOption {
    Arc::new(move |call| merge_filters(call, filters))
}

/// Fill in refuse filters of `base` plus fresh random jitter, re-rolled for
/// every call, on Accept and Decline calls that carry none.
#[must_use]
pub fn refuse_with_jitter(base: std::time::Duration) -> CallOption {
    Arc::new(move |call| merge_filters(call, Filters::refuse_with_jitter(base)))
}

fn merge_filters(call: &mut Call, filters: Filters) {
    match &mut call.kind {
        CallKind::Accept(accept) => {
            accept.filters.get_or_insert(filters);
        }
        CallKind::Decline(decline) => {
            decline.filters.get_or_insert(filters);
        }
        _ => {}
    }
}

/// Applies a fixed set of [`CallOption`]s on the push path.
pub struct CallOptionStage {
    options: Vec<CallOption>,
    downstream: BoxFlow,
}

impl CallOptionStage {
    /// Wrap `downstream`, applying `options` to every pushed call.
    #[must_use]
    pub fn new(downstream: BoxFlow, options: Vec<CallOption>) -> Self {
        Self {
            options,
            downstream,
        }
    }

    /// A factory for [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).
    #[must_use]
    pub fn factory(options: Vec<CallOption>) -> StageFactory {
        Arc::new(move |downstream| {
            Box::new(CallOptionStage::new(downstream, options.clone())) as BoxFlow
        })
    }
}

#[async_trait]
impl Flow for CallOptionStage {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        let message = match message {
            Message::Call(mut call) => {
                for option in &self.options {
                    option(&mut call);
                }
                Message::Call(call)
            }
            other => other,
        };
        self.downstream.push(message, ctx).await
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        self.downstream.pull(ctx).await
    }

    fn close(&self) {
        self.downstream.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::channel;
    use crate::message::OfferId;

    async fn push_and_receive(stage: &CallOptionStage, remote: &channel::ChannelRemote, call: Call) -> Call {
        let ctx = CancellationToken::new();
        stage.push(call.into(), &ctx).await.expect("push");
        match remote.recv().await.expect("pushed message") {
            Message::Call(call) => call,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn fills_missing_filters_on_decline() {
        let (root, remote) = channel::pair();
        let stage = CallOptionStage::new(
            Box::new(root),
            vec![default_filters(Filters {
                refuse_seconds: Some(3.0),
            })],
        );

        let received =
            push_and_receive(&stage, &remote, Call::decline(vec![OfferId::from("o1")])).await;
        match received.kind {
            CallKind::Decline(decline) => {
                assert_eq!(decline.filters, Some(Filters { refuse_seconds: Some(3.0) }));
            }
            other => panic!("unexpected call {}", other.name()),
        }
    }

    #[tokio::test]
    async fn keeps_caller_supplied_filters() {
        let (root, remote) = channel::pair();
        let stage = CallOptionStage::new(
            Box::new(root),
            vec![default_filters(Filters {
                refuse_seconds: Some(3.0),
            })],
        );

        let mut call = Call::decline(vec![OfferId::from("o1")]);
        if let CallKind::Decline(decline) = &mut call.kind {
            decline.filters = Some(Filters {
                refuse_seconds: Some(9.0),
            });
        }
        let received = push_and_receive(&stage, &remote, call).await;
        match received.kind {
            CallKind::Decline(decline) => {
                assert_eq!(decline.filters, Some(Filters { refuse_seconds: Some(9.0) }));
            }
            other => panic!("unexpected call {}", other.name()),
        }
    }

    #[tokio::test]
    async fn untargeted_calls_pass_unchanged() {
        let (root, remote) = channel::pair();
        let stage = CallOptionStage::new(
            Box::new(root),
            vec![default_filters(Filters {
                refuse_seconds: Some(3.0),
            })],
        );

        let received = push_and_receive(&stage, &remote, Call::revive()).await;
        assert_eq!(received, Call::revive());
    }
}
