//! End-to-end pipeline tests over an in-memory root flow, wired in the
//! production stage order: monitor, call options, heartbeat, ack,
//! framework id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use testresult::TestResult;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flotilla_core::error::FlowError;
use flotilla_core::flow::blueprint::BlueprintBuilder;
use flotilla_core::flow::{channel, Flow};
use flotilla_core::message::{
    AgentId, Call, CallKind, Event, Filters, FrameworkId, FrameworkInfo, Message, OfferId,
    Subscribed, TaskId, TaskState, TaskStatus, Update,
};
use flotilla_core::stage::{
    call_options, AckStage, CallOptionStage, FrameworkIdStage, HeartbeatConfig, HeartbeatStage,
    MonitorStage,
};

fn production_blueprint(heartbeat: HeartbeatConfig) -> flotilla_core::flow::blueprint::Blueprint {
    BlueprintBuilder::new()
        .append(MonitorStage::factory())
        .append(CallOptionStage::factory(vec![call_options::default_filters(
            Filters {
                refuse_seconds: Some(3.0),
            },
        )]))
        .append(HeartbeatStage::factory(heartbeat))
        .append(AckStage::factory())
        .append(FrameworkIdStage::factory())
        .build()
}

fn subscribed(id: &str, interval_seconds: Option<f64>) -> Message {
    Message::Event(Event::Subscribed(Subscribed {
        framework_id: FrameworkId::from(id),
        heartbeat_interval_seconds: interval_seconds,
    }))
}

fn update_with_token(token: Uuid) -> Message {
    Message::Event(Event::Update(Update {
        status: TaskStatus {
            task_id: TaskId::from("t1"),
            agent_id: AgentId::from("a1"),
            state: TaskState::Running,
            message: None,
            ack_token: Some(token),
        },
    }))
}

fn as_call(message: Message) -> Call {
    match message {
        Message::Call(call) => call,
        other => panic!("expected a call, got {other:?}"),
    }
}

#[tokio::test]
async fn subscription_flow_stamps_identity_and_filters() -> TestResult {
    let blueprint = production_blueprint(HeartbeatConfig::new(1));
    let (root, remote) = channel::pair();
    let pipeline = blueprint.materialize(Box::new(root));
    let ctx = CancellationToken::new();

    // The initial Subscribe goes out untouched.
    pipeline
        .push(
            Call::subscribe(FrameworkInfo::new("root", "demo")).into(),
            &ctx,
        )
        .await?;
    let sent = as_call(remote.recv().await.expect("subscribe on wire"));
    assert!(matches!(sent.kind, CallKind::Subscribe(_)));
    assert_eq!(sent.framework_id, None);

    // Subscribed assigns the session identity.
    remote.send(subscribed("fw-9", None)).await?;
    let event = pipeline.pull(&ctx).await?;
    assert!(matches!(event, Message::Event(Event::Subscribed(_))));

    // Later calls pick up both the identity and the default filters.
    pipeline
        .push(Call::decline(vec![OfferId::from("o1")]).into(), &ctx)
        .await?;
    let sent = as_call(remote.recv().await.expect("decline on wire"));
    assert_eq!(sent.framework_id, Some(FrameworkId::from("fw-9")));
    match sent.kind {
        CallKind::Decline(decline) => {
            assert_eq!(
                decline.filters,
                Some(Filters {
                    refuse_seconds: Some(3.0)
                })
            );
        }
        other => panic!("unexpected call {}", other.name()),
    }
    Ok(())
}

#[tokio::test]
async fn acknowledgment_follows_delivery_and_carries_identity() -> TestResult {
    let blueprint = production_blueprint(HeartbeatConfig::new(1));
    let (root, remote) = channel::pair();
    let pipeline = blueprint.materialize(Box::new(root));
    let ctx = CancellationToken::new();

    remote.send(subscribed("fw-9", None)).await?;
    pipeline.pull(&ctx).await?;

    let token = Uuid::new_v4();
    remote.send(update_with_token(token)).await?;
    pipeline.pull(&ctx).await?;

    // Nothing on the wire until the next operation flushes the ack.
    assert!(remote
        .recv_timeout(Duration::from_millis(20))
        .await
        .is_none());

    pipeline.push(Call::revive().into(), &ctx).await?;

    // The Acknowledge is flushed first and, being pushed below the
    // framework-id stage, carries the session identity.
    let first = as_call(remote.recv().await.expect("ack on wire"));
    match &first.kind {
        CallKind::Acknowledge(ack) => {
            assert_eq!(ack.token, token);
            assert_eq!(first.framework_id, Some(FrameworkId::from("fw-9")));
        }
        other => panic!("expected acknowledge first, got {}", other.name()),
    }
    let second = as_call(remote.recv().await.expect("revive on wire"));
    assert!(matches!(second.kind, CallKind::Revive));
    Ok(())
}

#[tokio::test]
async fn heartbeat_deadline_cuts_a_quiet_connection() -> TestResult {
    let blueprint = production_blueprint(HeartbeatConfig::new(1));
    let (root, remote) = channel::pair();
    let pipeline = blueprint.materialize(Box::new(root));
    let ctx = CancellationToken::new();

    remote.send(subscribed("fw-9", Some(0.025))).await?;
    pipeline.pull(&ctx).await?;

    let start = Instant::now();
    let result = pipeline.pull(&ctx).await;
    assert_eq!(result, Err(FlowError::DeadlineExceeded));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(45), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn close_is_idempotent_and_unblocks_a_parked_pull() {
    let blueprint = production_blueprint(HeartbeatConfig::new(1));
    let (root, _remote) = channel::pair();
    let pipeline: Arc<dyn Flow> = Arc::from(blueprint.materialize(Box::new(root)));

    let puller = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.pull(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    pipeline.close();
    assert_eq!(puller.await.expect("join"), Err(FlowError::Closed));
    pipeline.close(); // second close is a no-op
}
