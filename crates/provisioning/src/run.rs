//! A single provisioning run.

use common::{ResourceId, RunId};
use serde::Serialize;

use crate::events::RunEvent;
use crate::resource::{CreatedResource, ResourceKind};
use crate::state::RunState;

/// State of one orchestration call.
///
/// Created fresh for every call and dropped when the call returns. The run
/// only changes by applying [`RunEvent`]s; `created` grows only from
/// `StepCompleted` events applied while a step is running, so it lists
/// exactly the resources this run created, in creation order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisioningRun {
    id: RunId,
    state: RunState,
    created: Vec<CreatedResource>,
    completed_steps: usize,
    failure_reason: Option<String>,
    events: Vec<RunEvent>,
}

impl ProvisioningRun {
    /// Creates a run that has not started.
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Applies an event and appends it to the journal.
    pub fn record(&mut self, event: RunEvent) {
        self.apply(&event);
        self.events.push(event);
    }

    fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted(data) => {
                self.id = data.run_id;
            }
            RunEvent::StepStarted(data) => {
                if self.state.can_run() {
                    self.state = RunState::Running(data.index);
                }
            }
            RunEvent::StepCompleted(data) => {
                // Nothing is appended once a step has failed.
                if self.state == RunState::Running(data.index) {
                    self.completed_steps += 1;
                    if let Some(resource) = &data.resource {
                        self.created.push(resource.clone());
                    }
                }
            }
            RunEvent::StepFailed(data) => {
                self.failure_reason = Some(data.error.clone());
            }
            RunEvent::Cancelled(_) => {
                self.failure_reason
                    .get_or_insert_with(|| "cancelled".to_string());
            }
            RunEvent::RollbackStarted(_) => {
                if self.state.can_roll_back() {
                    self.state = RunState::RollingBack;
                }
            }
            RunEvent::ResourceDeleted(_) | RunEvent::DeleteFailed(_) => {
                // Rollback outcomes are journaled only; `created` stays intact.
            }
            RunEvent::RunSucceeded(_) => {
                if matches!(self.state, RunState::Running(_)) {
                    self.state = RunState::Succeeded;
                }
            }
            RunEvent::RunFailed(data) => {
                if self.state == RunState::RollingBack {
                    self.state = RunState::Failed;
                }
                self.failure_reason = Some(data.reason.clone());
            }
        }
    }
}

// Query methods
impl ProvisioningRun {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Resources created by this run, in creation order.
    pub fn created(&self) -> &[CreatedResource] {
        &self.created
    }

    /// Id produced by the step that created a resource of `kind`, if it ran.
    pub fn created_id(&self, kind: ResourceKind) -> Option<&ResourceId> {
        self.created
            .iter()
            .find(|resource| resource.kind == kind)
            .map(|resource| &resource.id)
    }

    /// Number of steps that completed successfully.
    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Every event applied to this run, in order.
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StepKind;

    fn extent(id: &str) -> CreatedResource {
        CreatedResource::new(ResourceKind::Extent, ResourceId::new(id))
    }

    fn started_run() -> ProvisioningRun {
        let mut run = ProvisioningRun::new(RunId::new());
        run.record(RunEvent::run_started(
            run.id(),
            vec![StepKind::CreateExtent, StepKind::LinkTargetExtent],
        ));
        run
    }

    #[test]
    fn test_new_run_is_empty() {
        let run = ProvisioningRun::new(RunId::new());
        assert_eq!(run.state(), RunState::NotStarted);
        assert!(run.created().is_empty());
        assert!(run.events().is_empty());
    }

    #[test]
    fn test_step_lifecycle_appends_created_resources() {
        let mut run = started_run();

        run.record(RunEvent::step_started(0, StepKind::CreateExtent));
        assert_eq!(run.state(), RunState::Running(0));

        run.record(RunEvent::step_completed(
            0,
            StepKind::CreateExtent,
            Some(extent("1")),
        ));
        assert_eq!(run.created(), &[extent("1")]);
        assert_eq!(run.created_id(ResourceKind::Extent), Some(&ResourceId::new("1")));
        assert_eq!(run.created_id(ResourceKind::Volume), None);

        run.record(RunEvent::step_started(1, StepKind::LinkTargetExtent));
        run.record(RunEvent::step_completed(
            1,
            StepKind::LinkTargetExtent,
            Some(CreatedResource::new(
                ResourceKind::TargetExtentLink,
                ResourceId::new("2"),
            )),
        ));
        run.record(RunEvent::run_succeeded());

        assert_eq!(run.state(), RunState::Succeeded);
        assert!(run.state().is_terminal());
        assert_eq!(run.completed_steps(), 2);
        assert_eq!(run.events().len(), 6);
    }

    #[test]
    fn test_failure_and_rollback_transitions() {
        let mut run = started_run();
        run.record(RunEvent::step_started(0, StepKind::CreateExtent));
        run.record(RunEvent::step_completed(
            0,
            StepKind::CreateExtent,
            Some(extent("1")),
        ));
        run.record(RunEvent::step_started(1, StepKind::LinkTargetExtent));
        run.record(RunEvent::step_failed(
            1,
            StepKind::LinkTargetExtent,
            "target busy",
        ));
        assert_eq!(run.failure_reason(), Some("target busy"));

        run.record(RunEvent::rollback_started(1));
        assert_eq!(run.state(), RunState::RollingBack);

        run.record(RunEvent::resource_deleted(extent("1")));
        run.record(RunEvent::run_failed("step link_target_extent failed"));

        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.created(), &[extent("1")]);
    }

    #[test]
    fn test_nothing_appended_after_rollback_started() {
        let mut run = started_run();
        run.record(RunEvent::step_started(0, StepKind::CreateExtent));
        run.record(RunEvent::rollback_started(0));

        run.record(RunEvent::step_completed(
            0,
            StepKind::CreateExtent,
            Some(extent("9")),
        ));
        run.record(RunEvent::step_started(1, StepKind::LinkTargetExtent));

        assert!(run.created().is_empty());
        assert_eq!(run.state(), RunState::RollingBack);
    }

    #[test]
    fn test_rollback_cannot_be_reentered() {
        let mut run = started_run();
        run.record(RunEvent::step_started(0, StepKind::CreateExtent));
        run.record(RunEvent::rollback_started(0));
        run.record(RunEvent::run_failed("boom"));

        run.record(RunEvent::rollback_started(0));
        run.record(RunEvent::run_succeeded());

        assert_eq!(run.state(), RunState::Failed);
    }

    #[test]
    fn test_cancel_before_start_leaves_run_not_started() {
        let mut run = ProvisioningRun::new(RunId::new());
        run.record(RunEvent::cancelled(0));
        run.record(RunEvent::rollback_started(0));

        assert_eq!(run.state(), RunState::NotStarted);
        assert_eq!(run.failure_reason(), Some("cancelled"));
    }
}
