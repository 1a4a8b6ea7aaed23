//! Example scheduler: launches a fixed number of tasks against an
//! in-process emulated master, with the full production pipeline in
//! between.

mod app;
mod emulator;
mod metrics;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use flotilla_core::flow::blueprint::BlueprintBuilder;
use flotilla_core::leader::{Endpoint, StaticResolver};
use flotilla_core::message::FrameworkInfo;
use flotilla_core::resources::Resources;
use flotilla_core::session::retry::RetryPolicy;
use flotilla_core::session::Session;
use flotilla_core::stage::{
    call_options, AckStage, CallOptionStage, FrameworkIdStage, HeartbeatConfig, HeartbeatStage,
    MonitorStage,
};

use crate::app::LaunchingScheduler;
use crate::emulator::{EmulatorConfig, EmulatorConnect};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Arguments::parse();
    let token = CancellationToken::new();

    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Ctrl+C — shutting down…");
                token.cancel();
            }
        });
    }
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let token = token.clone();
        tokio::spawn(async move {
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
                eprintln!("SIGTERM — shutting down…");
                token.cancel();
            }
        });
    }

    match args.metrics_bind {
        Some(addr) => {
            let handle = metrics::init_metrics()?;
            metrics::start_metrics_server(addr, handle).await?;
        }
        None => tracing::info!("metrics server disabled"),
    }

    let mut heartbeat = HeartbeatConfig::new(args.max_missed_heartbeats);
    if let Some(ms) = args.heartbeat_deadline_ms {
        heartbeat = heartbeat.with_deadline(Duration::from_millis(ms))?;
    }

    let blueprint = BlueprintBuilder::new()
        .append(MonitorStage::factory())
        .append(CallOptionStage::factory(vec![call_options::refuse_with_jitter(
            Duration::from_secs(3),
        )]))
        .append(HeartbeatStage::factory(heartbeat))
        .append(AckStage::factory())
        .append(FrameworkIdStage::factory())
        .build();

    let resolver = StaticResolver::new(args.masters.iter().cloned().map(Endpoint::from).collect())?;
    let connector = EmulatorConnect::new(EmulatorConfig {
        heartbeat_interval: Duration::from_secs_f64(args.emulator_heartbeat_seconds),
        offer_interval: Duration::from_secs_f64(args.emulator_offer_seconds),
        offer_resources: Resources::new(args.emulator_offer_cpus, args.emulator_offer_mem),
        agents: args.emulator_agents,
        fail_after: args
            .emulator_fail_after_seconds
            .map(Duration::from_secs_f64),
    });
    let handler = LaunchingScheduler::new(
        Resources::new(args.task_cpus, args.task_mem),
        args.num_tasks,
        args.task_command.clone(),
    );
    let policy = RetryPolicy::new(
        Duration::from_millis(args.backoff_base_ms),
        Duration::from_millis(args.backoff_max_ms),
    )?
    .with_jitter(0.1);

    let session = Session::new(
        connector,
        resolver,
        blueprint,
        FrameworkInfo::new(&args.framework_user, &args.framework_name),
        handler,
    )
    .with_retry_policy(policy);

    session.run(token).await;
    Ok(())
}

#[derive(Debug, Parser)]
#[command(version, about = "Example scheduler driving the flotilla engine")]
struct Arguments {
    /// Master endpoints, tried in order on failover.
    #[arg(
        long = "master",
        env = "FLOTILLA_MASTERS",
        default_value = "emulated-1:5050,emulated-2:5050",
        value_delimiter = ','
    )]
    masters: Vec<String>,

    /// User tasks run as.
    #[arg(long, default_value = "root")]
    framework_user: String,

    /// Framework name reported to the master.
    #[arg(long, default_value = "flotilla-example")]
    framework_name: String,

    /// Number of tasks to launch per session.
    #[arg(long, default_value_t = 5)]
    num_tasks: u32,

    /// Cpus per task.
    #[arg(long, default_value_t = 1.0)]
    task_cpus: f64,

    /// Memory per task in MiB.
    #[arg(long, default_value_t = 128.0)]
    task_mem: f64,

    /// Shell command tasks run.
    #[arg(long)]
    task_command: Option<String>,

    /// Missed heartbeats tolerated before the connection is declared dead.
    #[arg(long, default_value_t = 2)]
    max_missed_heartbeats: u32,

    /// Explicit heartbeat deadline override in milliseconds.
    #[arg(long)]
    heartbeat_deadline_ms: Option<u64>,

    /// Initial reconnect backoff in milliseconds.
    #[arg(long, default_value_t = 100)]
    backoff_base_ms: u64,

    /// Maximum reconnect backoff in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    backoff_max_ms: u64,

    /// Prometheus scrape address (e.g. 127.0.0.1:9090); disabled when
    /// unset.
    #[arg(long, env = "FLOTILLA_METRICS_BIND")]
    metrics_bind: Option<SocketAddr>,

    /// Emulated master: heartbeat interval in seconds.
    #[arg(long, default_value_t = 15.0)]
    emulator_heartbeat_seconds: f64,

    /// Emulated master: seconds between offer rounds.
    #[arg(long, default_value_t = 5.0)]
    emulator_offer_seconds: f64,

    /// Emulated master: cpus offered per agent.
    #[arg(long, default_value_t = 4.0)]
    emulator_offer_cpus: f64,

    /// Emulated master: memory offered per agent in MiB.
    #[arg(long, default_value_t = 4096.0)]
    emulator_offer_mem: f64,

    /// Emulated master: number of offering agents.
    #[arg(long, default_value_t = 3)]
    emulator_agents: u32,

    /// Emulated master: drop each connection after this many seconds,
    /// exercising reconnect.
    #[arg(long)]
    emulator_fail_after_seconds: Option<f64>,
}
