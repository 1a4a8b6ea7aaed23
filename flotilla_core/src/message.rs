//! Protocol messages exchanged over a subscription.
//!
//! [`Message`] is the closed tagged union every [`Flow`](crate::flow::Flow)
//! carries: outgoing [`Call`]s pushed by the scheduler and incoming
//! [`Event`]s pulled from the master. The byte-level encoding of these
//! messages is the transport's concern, not modeled here.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resources::Resources;

/// A message traveling through the pipeline in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// An outgoing call from the scheduler to the master.
    Call(Call),
    /// An incoming event from the master.
    Event(Event),
}

impl From<Call> for Message {
    fn from(call: Call) -> Message {
        Message::Call(call)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Message {
        Message::Event(event)
    }
}

/// An outgoing call, tagged with the session identity once one is known.
///
/// `framework_id` starts out unset; the framework-id stage injects the
/// captured identity into calls that still lack one. The initial Subscribe
/// legitimately carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Session identity assigned by the master, if already known.
    pub framework_id: Option<FrameworkId>,
    /// The call payload.
    pub kind: CallKind,
}

impl Call {
    /// Create a call with no session identity attached.
    #[must_use]
    pub fn new(kind: CallKind) -> Self {
        Self {
            framework_id: None,
            kind,
        }
    }

    /// The initial call that opens a session.
    #[must_use]
    pub fn subscribe(framework_info: FrameworkInfo) -> Self {
        Self::new(CallKind::Subscribe(Subscribe { framework_info }))
    }

    /// Accept offers, applying the given operations.
    #[must_use]
    pub fn accept(offer_ids: Vec<OfferId>, operations: Vec<Operation>) -> Self {
        Self::new(CallKind::Accept(Accept {
            offer_ids,
            operations,
            filters: None,
        }))
    }

    /// Decline offers.
    #[must_use]
    pub fn decline(offer_ids: Vec<OfferId>) -> Self {
        Self::new(CallKind::Decline(Decline {
            offer_ids,
            filters: None,
        }))
    }

    /// Acknowledge a status update.
    #[must_use]
    pub fn acknowledge(agent_id: AgentId, task_id: TaskId, token: Uuid) -> Self {
        Self::new(CallKind::Acknowledge(Acknowledge {
            agent_id,
            task_id,
            token,
        }))
    }

    /// Revive offers previously suppressed by filters.
    #[must_use]
    pub fn revive() -> Self {
        Self::new(CallKind::Revive)
    }

    /// Kill a running task.
    #[must_use]
    pub fn kill(task_id: TaskId, agent_id: Option<AgentId>) -> Self {
        Self::new(CallKind::Kill(Kill { task_id, agent_id }))
    }
}

/// The payload of an outgoing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallKind {
    /// Open a new session.
    Subscribe(Subscribe),
    /// Accept offers with a set of operations.
    Accept(Accept),
    /// Decline offers.
    Decline(Decline),
    /// Acknowledge a status update.
    Acknowledge(Acknowledge),
    /// Revive suppressed offers.
    Revive,
    /// Kill a task.
    Kill(Kill),
}

impl CallKind {
    /// Stable variant name, used for logging and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CallKind::Subscribe(_) => "subscribe",
            CallKind::Accept(_) => "accept",
            CallKind::Decline(_) => "decline",
            CallKind::Acknowledge(_) => "acknowledge",
            CallKind::Revive => "revive",
            CallKind::Kill(_) => "kill",
        }
    }
}

/// An incoming event on the subscription stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// The master accepted the subscription and assigned a session identity.
    Subscribed(Subscribed),
    /// Resource offers.
    Offers(Offers),
    /// A task status update.
    Update(Update),
    /// Liveness signal; carries no payload.
    Heartbeat,
    /// An agent or executor failed.
    Failure(Failure),
}

impl Event {
    /// Stable variant name, used for logging and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Subscribed(_) => "subscribed",
            Event::Offers(_) => "offers",
            Event::Update(_) => "update",
            Event::Heartbeat => "heartbeat",
            Event::Failure(_) => "failure",
        }
    }
}

impl From<Subscribed> for Event {
    fn from(subscribed: Subscribed) -> Event {
        Event::Subscribed(subscribed)
    }
}

impl From<Offers> for Event {
    fn from(offers: Offers) -> Event {
        Event::Offers(offers)
    }
}

impl From<Update> for Event {
    fn from(update: Update) -> Event {
        Event::Update(update)
    }
}

impl From<Failure> for Event {
    fn from(failure: Failure) -> Event {
        Event::Failure(failure)
    }
}

/// Payload of the initial Subscribe call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    /// Descriptive information about the subscribing framework.
    pub framework_info: FrameworkInfo,
}

/// Framework self-description sent with Subscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// The user tasks run as.
    pub user: String,
    /// Human-readable framework name.
    pub name: String,
}

impl FrameworkInfo {
    /// Create framework info with the given user and name.
    #[must_use]
    pub fn new(user: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            name: name.into(),
        }
    }
}

/// The master accepted the subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribed {
    /// The session identity assigned by the master.
    pub framework_id: FrameworkId,
    /// Declared heartbeat interval in fractional seconds, if the master
    /// emits heartbeats at all.
    pub heartbeat_interval_seconds: Option<f64>,
}

/// A batch of resource offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offers {
    /// The offers in this batch.
    pub offers: Vec<Offer>,
}

/// A single resource offer from one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Unique offer identity.
    pub id: OfferId,
    /// The agent whose resources are offered.
    pub agent_id: AgentId,
    /// Hostname of the offering agent.
    pub hostname: String,
    /// Offered resources.
    pub resources: Resources,
}

/// A task status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// The new status.
    pub status: TaskStatus,
}

/// Current status of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The task this status describes.
    pub task_id: TaskId,
    /// The agent running the task.
    pub agent_id: AgentId,
    /// The task's state.
    pub state: TaskState,
    /// Optional human-readable detail.
    pub message: Option<String>,
    /// Acknowledgment token. When present the master expects an explicit
    /// Acknowledge call carrying it back.
    pub ack_token: Option<Uuid>,
}

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepted by the master, not yet delivered to an agent.
    Staging,
    /// Launching on an agent.
    Starting,
    /// Running.
    Running,
    /// Terminated successfully.
    Finished,
    /// Terminated with an error.
    Failed,
    /// Killed on request.
    Killed,
    /// Lost due to agent or master failure.
    Lost,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// An agent or executor failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// The failed agent, when the failure concerns one.
    pub agent_id: Option<AgentId>,
    /// Optional detail from the master.
    pub message: Option<String>,
}

/// Accept offers, applying operations against their resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    /// The offers being consumed.
    pub offer_ids: Vec<OfferId>,
    /// Operations to apply.
    pub operations: Vec<Operation>,
    /// Offer filters for the declined remainder.
    pub filters: Option<Filters>,
}

/// Decline offers without using them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decline {
    /// The offers being declined.
    pub offer_ids: Vec<OfferId>,
    /// Offer filters applied to the decline.
    pub filters: Option<Filters>,
}

/// An operation applied when accepting offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Launch tasks against the accepted offers.
    Launch {
        /// Tasks to launch.
        tasks: Vec<TaskInfo>,
    },
}

/// Description of a task to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Human-readable task name.
    pub name: String,
    /// Task identity, chosen by the scheduler.
    pub task_id: TaskId,
    /// The agent to launch on.
    pub agent_id: AgentId,
    /// Shell command to run, if any.
    pub command: Option<String>,
    /// Resources reserved for the task.
    pub resources: Resources,
}

/// Acknowledge a status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledge {
    /// The agent that reported the status.
    pub agent_id: AgentId,
    /// The task the status concerned.
    pub task_id: TaskId,
    /// The token from the acknowledged status.
    pub token: Uuid,
}

/// Kill a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kill {
    /// The task to kill.
    pub task_id: TaskId,
    /// The agent running it, when known.
    pub agent_id: Option<AgentId>,
}

/// Offer filters attached to Accept and Decline calls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Filters {
    /// How long the master should withhold re-offering the declined
    /// resources, in fractional seconds.
    pub refuse_seconds: Option<f64>,
}

impl Filters {
    /// Filters refusing re-offers for the given duration.
    #[must_use]
    pub fn refuse_for(duration: Duration) -> Self {
        Self {
            refuse_seconds: Some(duration.as_secs_f64()),
        }
    }

    /// Filters refusing re-offers for the given duration plus up to one
    /// extra base duration of random jitter, spreading re-offer storms
    /// across frameworks.
    #[must_use]
    pub fn refuse_with_jitter(base: Duration) -> Self {
        use rand::Rng;
        let jitter = rand::thread_rng().gen_range(0.0..base.as_secs_f64().max(f64::EPSILON));
        Self {
            refuse_seconds: Some(base.as_secs_f64() + jitter),
        }
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Opaque session identity assigned by the master.
    FrameworkId
}

string_id! {
    /// Identity of a resource offer.
    OfferId
}

string_id! {
    /// Identity of an agent.
    AgentId
}

string_id! {
    /// Identity of a task.
    TaskId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_constructors_carry_no_identity() {
        let info = FrameworkInfo::new("root", "test");
        assert_eq!(Call::subscribe(info).framework_id, None);
        assert_eq!(Call::decline(vec![OfferId::from("o1")]).framework_id, None);
        assert_eq!(Call::revive().framework_id, None);
    }

    #[test]
    fn variant_names_are_stable() {
        assert_eq!(Call::revive().kind.name(), "revive");
        assert_eq!(Event::Heartbeat.name(), "heartbeat");
        let subscribed = Event::from(Subscribed {
            framework_id: FrameworkId::from("fw"),
            heartbeat_interval_seconds: Some(15.0),
        });
        assert_eq!(subscribed.name(), "subscribed");
    }

    #[test]
    fn refuse_filters_from_duration() {
        let filters = Filters::refuse_for(Duration::from_secs(3));
        assert_eq!(filters.refuse_seconds, Some(3.0));
    }

    #[test]
    fn refuse_filters_jitter_stays_in_range() {
        for _ in 0..32 {
            let filters = Filters::refuse_with_jitter(Duration::from_secs(3));
            let secs = filters.refuse_seconds.expect("jittered filters");
            assert!(secs >= 3.0);
            assert!(secs < 6.0);
        }
    }

    #[test]
    fn ids_display_raw_value() {
        let id = TaskId::from("42");
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.as_str(), "42");
    }
}
