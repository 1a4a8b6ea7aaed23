//! The example application: first-fit task launching over offers.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flotilla_core::error::FlowError;
use flotilla_core::flow::Flow;
use flotilla_core::message::{Call, Offer, Operation, TaskId, TaskInfo, TaskStatus};
use flotilla_core::resources::Resources;
use flotilla_core::session::SchedulerHandler;

/// Launches `num_tasks` identical tasks, packing them first-fit into
/// incoming offers. The launch counter is per-session: a reconnect starts
/// the count over, since tasks from the previous session are gone with it.
pub struct LaunchingScheduler {
    wants: Resources,
    num_tasks: u32,
    command: Option<String>,
    launched: u32,
}

impl LaunchingScheduler {
    /// Launch `num_tasks` tasks of `wants` resources each.
    pub fn new(wants: Resources, num_tasks: u32, command: Option<String>) -> Self {
        Self {
            wants,
            num_tasks,
            command,
            launched: 0,
        }
    }

    /// Pack tasks into one offer, first-fit, until the target count is
    /// reached or the offer is exhausted.
    fn pack(&mut self, offer: &Offer) -> Vec<TaskInfo> {
        let mut remaining = offer.resources;
        let mut tasks = Vec::new();

        while self.launched < self.num_tasks {
            let Some(rest) = remaining.checked_sub(&self.wants) else {
                break;
            };
            remaining = rest;
            self.launched += 1;
            tasks.push(TaskInfo {
                name: format!("task {}", self.launched),
                task_id: TaskId::new(self.launched.to_string()),
                agent_id: offer.agent_id.clone(),
                command: self.command.clone(),
                resources: self.wants,
            });
        }
        tasks
    }
}

#[async_trait]
impl SchedulerHandler for LaunchingScheduler {
    async fn on_offers(
        &mut self,
        offers: &[Offer],
        flow: &dyn Flow,
        ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        for offer in offers {
            tracing::debug!(offer = %offer.id, resources = %offer.resources, "offer received");
            let tasks = self.pack(offer);

            if tasks.is_empty() {
                tracing::debug!(offer = %offer.id, "declined");
                flow.push(Call::decline(vec![offer.id.clone()]).into(), ctx)
                    .await?;
            } else {
                tracing::info!(offer = %offer.id, count = tasks.len(), "launching");
                flow.push(
                    Call::accept(vec![offer.id.clone()], vec![Operation::Launch { tasks }]).into(),
                    ctx,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn on_update(
        &mut self,
        status: &TaskStatus,
        _flow: &dyn Flow,
        _ctx: &CancellationToken,
    ) -> Result<(), FlowError> {
        tracing::info!(task_id = %status.task_id, state = %status.state, "task update");
        Ok(())
    }

    fn on_reconnect(&mut self) {
        self.launched = 0;
    }
}
