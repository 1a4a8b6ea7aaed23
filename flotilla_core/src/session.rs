//! The session loop: connect, subscribe, dispatch, and reconnect.
//!
//! [`Session`] is the sole owner of retry. Every attempt resolves the
//! current leader, materializes a fresh pipeline from the blueprint,
//! subscribes, then pulls and dispatches events until any operation fails.
//! Failure tears the pipeline down, waits the current backoff delay, and
//! starts over; the delay schedule resets only once a Subscribed event
//! confirms the new session. The loop has no terminal failure state —
//! only cancellation of the caller's token ends it.

pub mod retry;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::connect::Connect;
use crate::error::{FlowError, ResolveError};
use crate::flow::blueprint::Blueprint;
use crate::flow::Flow;
use crate::leader::ResolveLeader;
use crate::message::{
    Call, Event, Failure, FrameworkInfo, Message, Offer, Subscribed, TaskStatus,
};
use crate::metrics::record;
use crate::session::retry::{Attempts, RetryPolicy};

/// States of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Resolving the leader and materializing a pipeline.
    Connecting,
    /// Subscribe pushed, waiting for the first event.
    Subscribing,
    /// Steady state: pulling and dispatching events.
    Subscribed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Subscribing => "subscribing",
            SessionState::Subscribed => "subscribed",
        }
    }
}

/// A failure ending one session attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The leader could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A flow operation failed.
    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Application callbacks driven by the session loop.
///
/// Handlers receive the live pipeline to push follow-up calls through, and
/// the loop's cancellation token to pass into those pushes. Returning an
/// error fails the current session attempt.
#[async_trait]
pub trait SchedulerHandler: Send {
    /// The session reached the Subscribed state.
    async fn on_subscribed(
        &mut self,
        _subscribed: &Subscribed,
        _flow: &dyn Flow,
        _ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// Resource offers arrived.
    async fn on_offers(
        &mut self,
        _offers: &[Offer],
        _flow: &dyn Flow,
        _ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// A task status update arrived. Acknowledgment is already handled by
    /// the pipeline.
    async fn on_update(
        &mut self,
        _status: &TaskStatus,
        _flow: &dyn Flow,
        _ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// An agent or executor failed. Not fatal to the session.
    async fn on_failure(
        &mut self,
        _failure: &Failure,
        _flow: &dyn Flow,
        _ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// A new attempt is starting; per-session bookkeeping must reset.
    fn on_reconnect(&mut self) {}
}

/// The top-level session state machine.
pub struct Session<C, R, H> {
    connector: C,
    resolver: R,
    handler: H,
    blueprint: Blueprint,
    framework_info: FrameworkInfo,
    policy: RetryPolicy,
}

impl<C, R, H> Session<C, R, H>
where
    C: Connect,
    R: ResolveLeader,
    H: SchedulerHandler,
{
    /// Assemble a session. Retry uses [`RetryPolicy::default`] until
    /// overridden with [`with_retry_policy`](Self::with_retry_policy).
    #[must_use]
    pub fn new(
        connector: C,
        resolver: R,
        blueprint: Blueprint,
        framework_info: FrameworkInfo,
        handler: H,
    ) -> Self {
        Self {
            connector,
            resolver,
            handler,
            blueprint,
            framework_info,
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drive the session until `token` is cancelled.
    ///
    /// Transient failures never end the loop; each one is logged with its
    /// attempt number and retried under the backoff policy.
    pub async fn run(mut self, token: CancellationToken) {
        let mut attempts = self.policy.attempts();

        loop {
            let attempt = attempts.next_attempt();
            if !attempt.delay.is_zero() {
                tracing::debug!(
                    attempt = attempt.number,
                    delay_ms = attempt.delay.as_millis() as u64,
                    "backing off"
                );
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(attempt.delay) => {}
                }
            }
            if token.is_cancelled() {
                break;
            }

            record::connect_attempt();
            tracing::info!(
                attempt = attempt.number,
                state = SessionState::Connecting.name(),
                "connecting"
            );
            self.handler.on_reconnect();

            match self.run_attempt(&mut attempts, &token).await {
                Ok(()) => break, // shutdown requested
                Err(error) => {
                    if token.is_cancelled() {
                        break;
                    }
                    record::session_failure();
                    tracing::warn!(attempt = attempt.number, error = %error, "session failed");
                    self.resolver.invalidate();
                }
            }
        }

        tracing::info!("session loop stopped");
    }

    /// One connect-subscribe-dispatch cycle. Returns `Ok(())` only on
    /// external cancellation.
    async fn run_attempt(
        &mut self,
        attempts: &mut Attempts,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        let endpoint = self.resolver.resolve().await?;
        tracing::debug!(endpoint = %endpoint, "leader resolved");

        let root = self.connector.connect(&endpoint).await?;
        let pipeline = self.blueprint.materialize(root);
        let result = self.drive(&*pipeline, attempts, token).await;
        pipeline.close();
        result
    }

    async fn drive(
        &mut self,
        flow: &dyn Flow,
        attempts: &mut Attempts,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        flow.push(Call::subscribe(self.framework_info.clone()).into(), token)
            .await?;
        let mut state = SessionState::Subscribing;

        loop {
            let message = match flow.pull(token).await {
                Ok(message) => message,
                Err(FlowError::Canceled) if token.is_cancelled() => return Ok(()),
                Err(error) => return Err(error.into()),
            };

            match message {
                Message::Event(event) => {
                    self.dispatch(event, flow, &mut state, attempts, token)
                        .await?;
                    if token.is_cancelled() {
                        return Ok(());
                    }
                }
                Message::Call(call) => {
                    return Err(FlowError::Protocol(format!(
                        "outgoing {} call arrived on the event stream",
                        call.kind.name()
                    ))
                    .into());
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        event: Event,
        flow: &dyn Flow,
        state: &mut SessionState,
        attempts: &mut Attempts,
        token: &CancellationToken,
    ) -> Result<(), FlowError> {
        tracing::debug!(event = event.name(), state = state.name(), "event received");
        match event {
            Event::Subscribed(subscribed) => {
                if *state == SessionState::Subscribing {
                    // Confirmed subscription is the only point the delay
                    // schedule resets.
                    attempts.reset();
                    record::subscribed();
                }
                *state = SessionState::Subscribed;
                tracing::info!(framework_id = %subscribed.framework_id, "subscribed");
                self.handler.on_subscribed(&subscribed, flow, token).await
            }
            Event::Offers(offers) => self.handler.on_offers(&offers.offers, flow, token).await,
            Event::Update(update) => {
                tracing::info!(
                    task_id = %update.status.task_id,
                    state = %update.status.state,
                    message = update.status.message.as_deref().unwrap_or(""),
                    "status update"
                );
                self.handler.on_update(&update.status, flow, token).await
            }
            Event::Heartbeat => Ok(()),
            Event::Failure(failure) => {
                tracing::warn!(
                    agent_id = failure.agent_id.as_ref().map_or("", |id| id.as_str()),
                    message = failure.message.as_deref().unwrap_or(""),
                    "failure event"
                );
                self.handler.on_failure(&failure, flow, token).await
            }
        }
    }
}
