//! Heartbeat watchdog: enforces a receive deadline on the pull path.
//!
//! The master declares its heartbeat interval in the Subscribed event. From
//! that point on, every pull is given a hard deadline of
//! `effective_interval * (max_missed_heartbeats + 1)`; a pull that exceeds
//! it reports [`FlowError::DeadlineExceeded`], which the session loop treats
//! as an unresponsive peer. The deadline is re-armed fresh on every pull
//! invocation, not accumulated from the last received message.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, FlowError};
use crate::flow::blueprint::StageFactory;
use crate::flow::{BoxFlow, Flow};
use crate::message::{Event, Message, Subscribed};

/// Watchdog configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    max_missed_heartbeats: u32,
    heartbeat_deadline: Option<Duration>,
}

impl HeartbeatConfig {
    /// Tolerate `max_missed_heartbeats` missed beats before declaring the
    /// peer dead: the enforced deadline is the effective interval times
    /// `max_missed_heartbeats + 1`.
    #[must_use]
    pub fn new(max_missed_heartbeats: u32) -> Self {
        Self {
            max_missed_heartbeats,
            heartbeat_deadline: None,
        }
    }

    /// Replace the Subscribed-declared interval with an explicit one. The
    /// missed-heartbeats multiplier still applies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroHeartbeatDeadline`] for a zero override;
    /// the enforced deadline must stay strictly positive.
    pub fn with_deadline(mut self, deadline: Duration) -> Result<Self, ConfigError> {
        if deadline.is_zero() {
            return Err(ConfigError::ZeroHeartbeatDeadline);
        }
        self.heartbeat_deadline = Some(deadline);
        Ok(self)
    }

    /// The deadline enforced once `subscribed` has been observed, or `None`
    /// when neither the event nor the configuration provides an interval.
    fn deadline_for(&self, subscribed: &Subscribed) -> Option<Duration> {
        let interval = self.heartbeat_deadline.or_else(|| {
            // Non-positive, non-finite, and absurdly large declared
            // intervals all leave the watchdog idle.
            subscribed
                .heartbeat_interval_seconds
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        })?;
        interval.checked_mul(self.max_missed_heartbeats.saturating_add(1))
    }
}

impl Default for HeartbeatConfig {
    /// Tolerates two missed heartbeats; no override.
    fn default() -> Self {
        Self::new(2)
    }
}

/// The watchdog stage. See the module docs for the deadline contract.
pub struct HeartbeatStage {
    config: HeartbeatConfig,
    deadline: Mutex<Option<Duration>>,
    downstream: BoxFlow,
}

impl HeartbeatStage {
    /// Wrap `downstream` with the watchdog.
    #[must_use]
    pub fn new(downstream: BoxFlow, config: HeartbeatConfig) -> Self {
        Self {
            config,
            deadline: Mutex::new(None),
            downstream,
        }
    }

    /// A factory for [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).
    #[must_use]
    pub fn factory(config: HeartbeatConfig) -> StageFactory {
        std::sync::Arc::new(move |downstream| {
            Box::new(HeartbeatStage::new(downstream, config)) as BoxFlow
        })
    }

    fn observe(&self, message: &Message) {
        if let Message::Event(Event::Subscribed(subscribed)) = message {
            let computed = self.config.deadline_for(subscribed);
            *self.deadline.lock().expect("deadline lock") = computed;
            match computed {
                Some(deadline) => {
                    tracing::debug!(deadline_ms = deadline.as_millis() as u64, "heartbeat armed");
                }
                None => tracing::debug!("no heartbeat interval declared, watchdog idle"),
            }
        }
    }
}

#[async_trait]
impl Flow for HeartbeatStage {
    async fn push(&self, message: Message, ctx: &CancellationToken) -> Result<(), FlowError> {
        self.downstream.push(message, ctx).await
    }

    async fn pull(&self, ctx: &CancellationToken) -> Result<Message, FlowError> {
        let armed = *self.deadline.lock().expect("deadline lock");
        let message = match armed {
            None => self.downstream.pull(ctx).await?,
            // The caller's token is forwarded unchanged, so an external
            // cancellation still wins over the tighter deadline.
            Some(deadline) => match tokio::time::timeout(deadline, self.downstream.pull(ctx)).await
            {
                Ok(result) => result?,
                Err(_elapsed) => return Err(FlowError::DeadlineExceeded),
            },
        };
        self.observe(&message);
        Ok(message)
    }

    fn close(&self) {
        self.downstream.close();
    }
}
