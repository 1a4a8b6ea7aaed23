//! Protocol stages composing the subscription pipeline.
//!
//! A stage is a [`Flow`](crate::flow::Flow) wrapping exactly one downstream
//! flow. The default posture is pass-through in both directions; a concrete
//! stage intercepts one or both to observe, mutate, or inject messages. A
//! stage must never reorder messages relative to what it forwards, and must
//! propagate cancellation and downstream errors unless the error is
//! precisely the condition the stage exists to handle. Retry belongs to the
//! session loop alone — no stage retries internally.
//!
//! Each stage ships a `factory` constructor producing the
//! [`StageFactory`](crate::flow::blueprint::StageFactory) consumed by
//! [`BlueprintBuilder`](crate::flow::blueprint::BlueprintBuilder).

pub mod ack;
pub mod call_options;
pub mod framework_id;
pub mod heartbeat;
pub mod monitor;

pub use ack::AckStage;
pub use call_options::{CallOption, CallOptionStage};
pub use framework_id::FrameworkIdStage;
pub use heartbeat::{HeartbeatConfig, HeartbeatStage};
pub use monitor::MonitorStage;
