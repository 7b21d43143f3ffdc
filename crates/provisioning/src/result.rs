//! Composite result of a successful run.

use common::ResourceId;
use serde::{Deserialize, Serialize};

use crate::plan::ResolvedReuseIds;
use crate::resource::ResourceKind;
use crate::run::ProvisioningRun;

/// Ids of every resource making up the provisioned target.
///
/// Reused resources carry their original id; created ones carry the id the
/// control plane returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub volume_id: Option<ResourceId>,
    pub extent_id: ResourceId,
    pub portal_id: Option<ResourceId>,
    pub initiator_group_id: Option<ResourceId>,
    pub target_id: ResourceId,
    pub target_extent_link_id: ResourceId,
    pub fibre_channel_linked: bool,
}

impl ProvisioningResult {
    /// Assembles the result of a run whose steps all succeeded.
    ///
    /// Returns the first mandatory kind with no id on error.
    pub(crate) fn assemble(
        run: &ProvisioningRun,
        resolved: &ResolvedReuseIds,
        fibre_channel_linked: bool,
    ) -> Result<Self, ResourceKind> {
        let created = |kind| run.created_id(kind).cloned();

        let extent_id = created(ResourceKind::Extent).ok_or(ResourceKind::Extent)?;
        let target_id = created(ResourceKind::Target)
            .or_else(|| resolved.target.clone())
            .ok_or(ResourceKind::Target)?;
        let target_extent_link_id =
            created(ResourceKind::TargetExtentLink).ok_or(ResourceKind::TargetExtentLink)?;

        Ok(Self {
            volume_id: created(ResourceKind::Volume),
            extent_id,
            portal_id: created(ResourceKind::Portal).or_else(|| resolved.portal.clone()),
            initiator_group_id: created(ResourceKind::InitiatorGroup)
                .or_else(|| resolved.initiator_group.clone()),
            target_id,
            target_extent_link_id,
            fibre_channel_linked,
        })
    }
}
