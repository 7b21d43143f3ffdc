//! Provisioning error types.

use thiserror::Error;

use crate::plan::StepKind;
use crate::resource::{CreatedResource, ResourceKind};
use crate::rollback::RollbackReport;

/// Errors returned by a [`ResourceClient`](crate::client::ResourceClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane refused the operation.
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// A resource with the same name already exists.
    #[error("{kind} '{name}' already exists")]
    Conflict { kind: ResourceKind, name: String },

    /// Non-success HTTP status from the control plane.
    #[error("control plane returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport-level failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control plane answered with something we could not decode.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Structural problems with an intent, found before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("a portal cannot be used with a Fibre Channel target")]
    PortalNotAllowed,

    #[error("an initiator group cannot be used with a Fibre Channel target")]
    InitiatorGroupNotAllowed,

    #[error("a Fibre Channel target requires a Fibre Channel port")]
    MissingFibreChannelPort,

    #[error("a Fibre Channel port cannot be used with an iSCSI target")]
    FibreChannelPortNotAllowed,

    #[error("a new iSCSI target requires a portal")]
    MissingPortal,

    #[error("portal and initiator group only apply to a new target")]
    GroupsWithReusedTarget,
}

/// Why a single step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A step needed an id that no earlier step or reuse choice supplied.
    #[error("no {0} id available")]
    UnresolvedReference(ResourceKind),
}

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The intent is structurally inconsistent. Nothing was created.
    #[error("Invalid provisioning plan: {0}")]
    PlanInvalid(#[from] PlanError),

    /// A remote step failed; everything created before it was rolled back.
    #[error("Step '{kind}' failed")]
    StepFailed {
        kind: StepKind,
        #[source]
        cause: StepError,
        rollback: RollbackReport,
    },

    /// The run was cancelled between steps and rolled back.
    #[error("Provisioning cancelled after {completed} step(s)")]
    Cancelled {
        completed: usize,
        rollback: RollbackReport,
    },

    /// Every step succeeded but a mandatory id was missing from the run.
    #[error("Provisioning finished without a {missing} id")]
    Incomplete {
        missing: ResourceKind,
        rollback: RollbackReport,
    },
}

impl ProvisionError {
    /// Returns the rollback report attached to this error, if rollback ran.
    pub fn rollback_report(&self) -> Option<&RollbackReport> {
        match self {
            ProvisionError::PlanInvalid(_) => None,
            ProvisionError::StepFailed { rollback, .. }
            | ProvisionError::Cancelled { rollback, .. }
            | ProvisionError::Incomplete { rollback, .. } => Some(rollback),
        }
    }

    /// Resources that rollback failed to delete and may need manual cleanup.
    pub fn orphans(&self) -> Vec<CreatedResource> {
        self.rollback_report()
            .map(RollbackReport::orphans)
            .unwrap_or_default()
    }

    /// Returns the kind of the step that failed, if a step failed.
    pub fn failed_step(&self) -> Option<StepKind> {
        match self {
            ProvisionError::StepFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Convenience type alias for provisioning results.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
