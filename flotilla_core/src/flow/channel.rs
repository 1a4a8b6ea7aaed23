//! In-memory, channel-backed flows.
//!
//! [`pair`] yields a [`ChannelFlow`] and the [`ChannelRemote`] driving its
//! far side. The pair stands in for a transport-backed root flow: the test
//! suite scripts masters with it, and the CLI's emulator runs a whole
//! in-process master behind one.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Flow;
use crate::error::FlowError;
use crate::message::Message;

/// Create a connected flow/remote pair.
#[must_use]
pub fn pair() -> (ChannelFlow, ChannelRemote) {
    let (calls_tx, calls_rx) = async_channel::unbounded();
    let (events_tx, events_rx) = async_channel::unbounded();
    let closed = CancellationToken::new();

    let flow = ChannelFlow {
        outbound: calls_tx,
        inbound: events_rx,
        closed: closed.clone(),
    };
    let remote = ChannelRemote {
        calls: calls_rx,
        events: events_tx,
        closed,
    };
    (flow, remote)
}

/// A [`Flow`] whose far side is an in-process [`ChannelRemote`].
#[derive(Debug, Clone)]
pub struct ChannelFlow {
    outbound: async_channel::Sender<Message>,
    inbound: async_channel::Receiver<Message>,
    closed: CancellationToken,
}

#[async_trait]
impl Flow for ChannelFlow {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        tokio::select! {
            () = ctx.cancelled() => Err(FlowError::Canceled),
            () = self.closed.cancelled() => Err(FlowError::Closed),
            sent = self.outbound.send(message) => sent.map_err(|_| FlowError::Closed),
        }
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        tokio::select! {
            () = ctx.cancelled() => Err(FlowError::Canceled),
            () = self.closed.cancelled() => Err(FlowError::Closed),
            received = self.inbound.recv() => received.map_err(|_| FlowError::Closed),
        }
    }

    fn close(&self) {
        self.closed.cancel();
        self.outbound.close();
        self.inbound.close();
    }
}

/// The far side of a [`ChannelFlow`]: observes pushed calls, injects events.
#[derive(Debug, Clone)]
pub struct ChannelRemote {
    calls: async_channel::Receiver<Message>,
    events: async_channel::Sender<Message>,
    closed: CancellationToken,
}

impl ChannelRemote {
    /// Deliver a message to the flow's pull side.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Closed`] once either side has closed.
    pub async fn send(&self, message: Message) -> Result<(), FlowError> {
        self.events
            .send(message)
            .await
            .map_err(|_| FlowError::Closed)
    }

    /// Receive the next message pushed by the flow, or `None` once closed.
    pub async fn recv(&self) -> Option<Message> {
        self.calls.recv().await.ok()
    }

    /// Receive the next pushed message, waiting at most `timeout`.
    pub async fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.recv()).await.ok()?
    }

    /// Drop the connection, as a failing transport would.
    pub fn close(&self) {
        self.closed.cancel();
        self.calls.close();
        self.events.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::{Call, Event};

    #[tokio::test]
    async fn preserves_order_per_direction() {
        let (flow, remote) = pair();
        let ctx = CancellationToken::new();

        flow.push(Call::revive().into(), &ctx).await.expect("push");
        flow.push(
            Call::decline(vec!["o1".into()]).into(),
            &ctx,
        )
        .await
        .expect("push");

        let first = remote.recv().await.expect("first");
        let second = remote.recv().await.expect("second");
        assert!(matches!(
            first,
            Message::Call(Call {
                kind: crate::message::CallKind::Revive,
                ..
            })
        ));
        assert!(matches!(
            second,
            Message::Call(Call {
                kind: crate::message::CallKind::Decline(_),
                ..
            })
        ));

        remote.send(Event::Heartbeat.into()).await.expect("send");
        assert_eq!(
            flow.pull(&ctx).await.expect("pull"),
            Message::Event(Event::Heartbeat)
        );
    }

    #[tokio::test]
    async fn close_unblocks_parked_pull() {
        let (flow, _remote) = pair();
        let ctx = CancellationToken::new();

        let puller = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.pull(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        flow.close();

        let result = puller.await.expect("join");
        assert_eq!(result, Err(FlowError::Closed));

        // Idempotent: a second close is a no-op, and operations keep
        // reporting Closed.
        flow.close();
        assert_eq!(flow.pull(&ctx).await, Err(FlowError::Closed));
        assert_eq!(
            flow.push(Call::revive().into(), &ctx).await,
            Err(FlowError::Closed)
        );
    }

    #[tokio::test]
    async fn cancellation_unblocks_parked_pull() {
        let (flow, _remote) = pair();
        let ctx = CancellationToken::new();

        let puller = {
            let flow = flow.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { flow.pull(&ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        assert_eq!(puller.await.expect("join"), Err(FlowError::Canceled));
    }

    #[tokio::test]
    async fn remote_close_reads_as_closed() {
        let (flow, remote) = pair();
        let ctx = CancellationToken::new();

        remote.close();
        assert_eq!(flow.pull(&ctx).await, Err(FlowError::Closed));
    }
}
