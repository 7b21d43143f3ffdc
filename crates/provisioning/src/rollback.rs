//! Rollback controller.
//!
//! Deletes the resources a run created, newest first, so dependents go
//! before the things they depend on (link before target, target before
//! portal, extent before volume). Every resource is attempted even when an
//! earlier delete fails; failures are collected into a [`RollbackReport`]
//! rather than returned as errors.

use common::ResourceId;
use serde::Serialize;

use crate::client::ResourceClient;
use crate::error::ClientError;
use crate::resource::{CreatedResource, ResourceKind};

/// A delete that failed during rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackFailure {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub error: String,
}

impl RollbackFailure {
    pub fn resource(&self) -> CreatedResource {
        CreatedResource::new(self.kind, self.id.clone())
    }
}

/// Outcome of a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Resources a delete was issued for, in the order it was issued.
    pub attempted: Vec<CreatedResource>,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    /// Returns true if every delete succeeded (or nothing needed deleting).
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Resources left behind because their delete failed.
    pub fn orphans(&self) -> Vec<CreatedResource> {
        self.failures.iter().map(RollbackFailure::resource).collect()
    }
}

/// Deletes `created` in reverse order, best-effort.
#[tracing::instrument(skip_all, fields(resources = created.len()))]
pub async fn rollback(created: &[CreatedResource], client: &dyn ResourceClient) -> RollbackReport {
    let mut report = RollbackReport::default();

    for resource in created.iter().rev() {
        report.attempted.push(resource.clone());

        match delete(client, resource).await {
            Ok(()) => {
                tracing::info!(kind = %resource.kind, id = %resource.id, "rollback delete succeeded");
            }
            Err(e) => {
                metrics::counter!("provisioning_rollback_deletes_failed").increment(1);
                tracing::warn!(
                    kind = %resource.kind,
                    id = %resource.id,
                    error = %e,
                    "rollback delete failed, continuing"
                );
                report.failures.push(RollbackFailure {
                    kind: resource.kind,
                    id: resource.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

async fn delete(client: &dyn ResourceClient, resource: &CreatedResource) -> Result<(), ClientError> {
    let id = &resource.id;
    match resource.kind {
        ResourceKind::Volume => client.delete_volume(id).await,
        ResourceKind::Extent => client.delete_extent(id).await,
        ResourceKind::Portal => client.delete_portal(id).await,
        ResourceKind::InitiatorGroup => client.delete_initiator_group(id).await,
        ResourceKind::Target => client.delete_target(id).await,
        ResourceKind::TargetExtentLink => client.delete_target_extent_link(id).await,
    }
}
