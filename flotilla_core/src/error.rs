//! Error types for the flow pipeline and session loop.

use thiserror::Error;

/// Errors surfaced by [`Flow`](crate::flow::Flow) operations.
///
/// Stages forward every error they do not specifically own; none of the
/// protocol stages suppresses errors, only messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The flow (or a downstream flow) has been closed.
    #[error("flow closed")]
    Closed,

    /// The caller's cancellation token fired while the operation was blocked.
    #[error("operation canceled")]
    Canceled,

    /// No message arrived within the heartbeat deadline.
    #[error("heartbeat deadline exceeded")]
    DeadlineExceeded,

    /// Connection or I/O failure. Fatal to the current session.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected message. Treated like a transport failure.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Construction-time validation failures.
///
/// These fail fast when a stage, policy, or resolver is built and are never
/// retried or silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An explicit heartbeat deadline override must be strictly positive.
    #[error("heartbeat deadline override must be positive")]
    ZeroHeartbeatDeadline,

    /// The leader candidate list must not be empty.
    #[error("endpoint list is empty")]
    NoEndpoints,

    /// The base retry delay must be strictly positive.
    #[error("retry base delay must be positive")]
    ZeroRetryBase,
}

/// Leader resolution failed; the session retries under its backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("leader resolution failed: {0}")]
pub struct ResolveError(pub String);
