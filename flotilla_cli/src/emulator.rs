//! An in-process master emulator.
//!
//! Stands in for the out-of-scope HTTP transport so the engine can be run
//! and demonstrated end to end: it confirms subscriptions, emits heartbeats
//! and offer rounds, answers launches with running-task updates carrying
//! acknowledgment tokens, and can drop the connection on a schedule to
//! exercise the reconnect path.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use flotilla_core::connect::Connect;
use flotilla_core::error::FlowError;
use flotilla_core::flow::channel::{self, ChannelRemote};
use flotilla_core::flow::BoxFlow;
use flotilla_core::leader::Endpoint;
use flotilla_core::message::{
    AgentId, CallKind, Event, FrameworkId, Message, Offer, OfferId, Offers, Operation, Subscribed,
    TaskState, TaskStatus, Update,
};
use flotilla_core::resources::Resources;

/// Behavior of the emulated master.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Declared and honored heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Time between offer rounds.
    pub offer_interval: Duration,
    /// Resources offered per agent per round.
    pub offer_resources: Resources,
    /// Number of offering agents.
    pub agents: u32,
    /// Drop the connection after this long, forcing a reconnect.
    pub fail_after: Option<Duration>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            offer_interval: Duration::from_secs(5),
            offer_resources: Resources::new(4.0, 4096.0),
            agents: 3,
            fail_after: None,
        }
    }
}

/// A [`Connect`] implementation backed by one emulated master per
/// connection.
#[derive(Debug, Clone)]
pub struct EmulatorConnect {
    config: EmulatorConfig,
}

impl EmulatorConnect {
    /// Create a connector with the given emulator behavior.
    pub fn new(config: EmulatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connect for EmulatorConnect {
    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxFlow, FlowError> {
        let (flow, remote) = channel::pair();
        tracing::info!(endpoint = %endpoint, "emulated master accepting connection");
        tokio::spawn(run_master(remote, self.config.clone()));
        Ok(Box::new(flow))
    }
}

async fn run_master(remote: ChannelRemote, config: EmulatorConfig) {
    // The session must speak first, with a Subscribe.
    let subscribed = match remote.recv().await {
        Some(Message::Call(call)) if matches!(call.kind, CallKind::Subscribe(_)) => Subscribed {
            framework_id: FrameworkId::new(format!("fw-{}", Uuid::new_v4())),
            heartbeat_interval_seconds: Some(config.heartbeat_interval.as_secs_f64()),
        },
        other => {
            tracing::warn!(?other, "emulated master expected subscribe");
            remote.close();
            return;
        }
    };
    tracing::info!(framework_id = %subscribed.framework_id, "emulated master subscribed");
    if remote.send(Event::Subscribed(subscribed).into()).await.is_err() {
        return;
    }

    let mut heartbeats = tokio::time::interval(config.heartbeat_interval);
    let mut offers = tokio::time::interval(config.offer_interval);
    let failure = async {
        match config.fail_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(failure);
    let mut offer_round = 0u64;

    loop {
        tokio::select! {
            _ = heartbeats.tick() => {
                if remote.send(Event::Heartbeat.into()).await.is_err() {
                    break;
                }
            }
            _ = offers.tick() => {
                offer_round += 1;
                let batch = offer_batch(&config, offer_round);
                if remote.send(Event::Offers(batch).into()).await.is_err() {
                    break;
                }
            }
            () = &mut failure => {
                tracing::info!("emulated master dropping the connection");
                remote.close();
                break;
            }
            incoming = remote.recv() => {
                let Some(message) = incoming else { break };
                if handle_call(&remote, message).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn offer_batch(config: &EmulatorConfig, round: u64) -> Offers {
    let offers = (0..config.agents)
        .map(|agent| Offer {
            id: OfferId::new(format!("offer-{round}-{agent}")),
            agent_id: AgentId::new(format!("agent-{agent}")),
            hostname: format!("agent-{agent}.local"),
            resources: config.offer_resources,
        })
        .collect();
    Offers { offers }
}

async fn handle_call(remote: &ChannelRemote, message: Message) -> Result<(), FlowError> {
    let Message::Call(call) = message else {
        tracing::warn!("emulated master received a non-call message");
        return Ok(());
    };
    match call.kind {
        CallKind::Accept(accept) => {
            for operation in accept.operations {
                let Operation::Launch { tasks } = operation;
                for task in tasks {
                    let update = Update {
                        status: TaskStatus {
                            task_id: task.task_id,
                            agent_id: task.agent_id,
                            state: TaskState::Running,
                            message: None,
                            ack_token: Some(Uuid::new_v4()),
                        },
                    };
                    remote.send(Event::Update(update).into()).await?;
                }
            }
        }
        CallKind::Kill(kill) => {
            let update = Update {
                status: TaskStatus {
                    task_id: kill.task_id,
                    agent_id: kill.agent_id.unwrap_or_else(|| AgentId::from("agent-0")),
                    state: TaskState::Killed,
                    message: None,
                    ack_token: Some(Uuid::new_v4()),
                },
            };
            remote.send(Event::Update(update).into()).await?;
        }
        CallKind::Acknowledge(ack) => {
            tracing::debug!(task_id = %ack.task_id, "status acknowledged");
        }
        CallKind::Decline(_) | CallKind::Revive => {}
        CallKind::Subscribe(_) => {
            tracing::warn!("duplicate subscribe on an established session");
        }
    }
    Ok(())
}
