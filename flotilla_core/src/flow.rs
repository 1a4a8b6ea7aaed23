//! The bidirectional, cancellable message-channel contract.
//!
//! Every component of the pipeline — the transport-backed root, each
//! protocol stage, and the materialized pipeline handed to the session loop
//! — speaks [`Flow`]. Messages preserve submission order within each
//! direction independently; the push and pull directions are uncorrelated.

pub mod blueprint;
pub mod channel;
pub mod test_utils;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::message::Message;

/// A bidirectional, cancellable message channel.
///
/// `push` and `pull` block until the operation completes, the flow is
/// closed, or the caller's `ctx` token fires. Implementations must treat
/// `ctx` as authoritative: a stage may derive a tighter deadline around a
/// downstream call, but external cancellation always wins.
#[async_trait]
pub trait Flow: Send + Sync {
    /// Send a message toward the transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the flow is closed, `ctx` fires, or a
    /// downstream stage or the transport fails.
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError>;

    /// Receive the next message from the transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the flow is closed, `ctx` fires, the heartbeat
    /// deadline elapses, or a downstream stage or the transport fails.
    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError>;

    /// Release owned resources.
    ///
    /// Idempotent, and safe to invoke from outside the consumer thread to
    /// unblock a parked `push` or `pull` with [`FlowError::Closed`].
    fn close(&self);
}

/// An owned, type-erased flow, as produced by materializing a
/// [`Blueprint`](blueprint::Blueprint).
pub type BoxFlow = Box<dyn Flow>;
