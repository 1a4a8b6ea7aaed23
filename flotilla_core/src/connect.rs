//! Transport collaborator contract.
//!
//! A [`Connect`] implementation turns a resolved endpoint into a root
//! [`Flow`](crate::flow::Flow) speaking already-decoded messages: its push
//! sends an encoded call, its pull yields the next decoded event from the
//! peer's stream. Byte-level framing is entirely the implementation's
//! concern.

use async_trait::async_trait;

use crate::error::FlowError;
use crate::flow::BoxFlow;
use crate::leader::Endpoint;

/// Establishes the transport-backed root flow for one session.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Connect to `endpoint` and return the root flow.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Transport`] when the connection cannot be
    /// established; the session loop retries under its backoff policy.
    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxFlow, FlowError>;
}
