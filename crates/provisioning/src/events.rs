//! Provisioning run events.
//!
//! A run's state only changes by applying one of these events, and the run
//! keeps every applied event as its journal.

use chrono::{DateTime, Utc};
use common::{ResourceId, RunId};
use serde::{Deserialize, Serialize};

use crate::plan::StepKind;
use crate::resource::{CreatedResource, ResourceKind};

/// Events that can occur during a provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunEvent {
    /// The run began executing a plan.
    RunStarted(RunStartedData),

    /// A step started executing.
    StepStarted(StepData),

    /// A step completed successfully.
    StepCompleted(StepCompletedData),

    /// A step failed.
    StepFailed(StepFailedData),

    /// A cancellation request was observed between steps.
    Cancelled(CancelledData),

    /// Rollback started after a failure or cancellation.
    RollbackStarted(RollbackStartedData),

    /// A rollback delete succeeded.
    ResourceDeleted(CreatedResource),

    /// A rollback delete failed (logged, rollback continues).
    DeleteFailed(DeleteFailedData),

    /// All steps completed.
    RunSucceeded(RunFinishedData),

    /// The run failed and rollback has finished.
    RunFailed(RunFailedData),
}

impl RunEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted(_) => "RunStarted",
            RunEvent::StepStarted(_) => "StepStarted",
            RunEvent::StepCompleted(_) => "StepCompleted",
            RunEvent::StepFailed(_) => "StepFailed",
            RunEvent::Cancelled(_) => "Cancelled",
            RunEvent::RollbackStarted(_) => "RollbackStarted",
            RunEvent::ResourceDeleted(_) => "ResourceDeleted",
            RunEvent::DeleteFailed(_) => "DeleteFailed",
            RunEvent::RunSucceeded(_) => "RunSucceeded",
            RunEvent::RunFailed(_) => "RunFailed",
        }
    }
}

/// Data for RunStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedData {
    pub run_id: RunId,
    /// Step kinds of the plan, in execution order.
    pub steps: Vec<StepKind>,
    pub started_at: DateTime<Utc>,
}

/// Data for StepStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    /// Index of the step in the plan.
    pub index: usize,
    pub kind: StepKind,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub index: usize,
    pub kind: StepKind,
    /// The resource the step created; `None` for the port binding.
    pub resource: Option<CreatedResource>,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub index: usize,
    pub kind: StepKind,
    pub error: String,
}

/// Data for Cancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledData {
    /// Number of steps that had completed when cancellation was observed.
    pub completed: usize,
}

/// Data for RollbackStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStartedData {
    /// Number of resources to delete.
    pub resources: usize,
}

/// Data for DeleteFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFailedData {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub error: String,
}

/// Data for RunSucceeded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFinishedData {
    pub finished_at: DateTime<Utc>,
}

/// Data for RunFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl RunEvent {
    pub fn run_started(run_id: RunId, steps: Vec<StepKind>) -> Self {
        RunEvent::RunStarted(RunStartedData {
            run_id,
            steps,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(index: usize, kind: StepKind) -> Self {
        RunEvent::StepStarted(StepData { index, kind })
    }

    pub fn step_completed(index: usize, kind: StepKind, resource: Option<CreatedResource>) -> Self {
        RunEvent::StepCompleted(StepCompletedData {
            index,
            kind,
            resource,
        })
    }

    pub fn step_failed(index: usize, kind: StepKind, error: impl Into<String>) -> Self {
        RunEvent::StepFailed(StepFailedData {
            index,
            kind,
            error: error.into(),
        })
    }

    pub fn cancelled(completed: usize) -> Self {
        RunEvent::Cancelled(CancelledData { completed })
    }

    pub fn rollback_started(resources: usize) -> Self {
        RunEvent::RollbackStarted(RollbackStartedData { resources })
    }

    pub fn resource_deleted(resource: CreatedResource) -> Self {
        RunEvent::ResourceDeleted(resource)
    }

    pub fn delete_failed(
        kind: ResourceKind,
        id: ResourceId,
        error: impl Into<String>,
    ) -> Self {
        RunEvent::DeleteFailed(DeleteFailedData {
            kind,
            id,
            error: error.into(),
        })
    }

    pub fn run_succeeded() -> Self {
        RunEvent::RunSucceeded(RunFinishedData {
            finished_at: Utc::now(),
        })
    }

    pub fn run_failed(reason: impl Into<String>) -> Self {
        RunEvent::RunFailed(RunFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        assert_eq!(
            RunEvent::run_started(RunId::new(), vec![]).event_type(),
            "RunStarted"
        );
        assert_eq!(
            RunEvent::step_started(0, StepKind::CreateExtent).event_type(),
            "StepStarted"
        );
        assert_eq!(RunEvent::cancelled(2).event_type(), "Cancelled");
        assert_eq!(RunEvent::run_failed("x").event_type(), "RunFailed");
    }

    #[test]
    fn test_serialization_uses_type_tag() {
        let event = RunEvent::step_completed(
            1,
            StepKind::CreateExtent,
            Some(CreatedResource::new(ResourceKind::Extent, ResourceId::new("3"))),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StepCompleted");
        assert_eq!(json["data"]["kind"], "create_extent");
        assert_eq!(json["data"]["resource"]["kind"], "extent");
        assert_eq!(json["data"]["resource"]["id"], "3");

        let back: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
