//! Step plan builder.
//!
//! Turns an intent into the ordered list of steps a run executes. Resources
//! the operator chose to reuse produce no step; their ids are carried in
//! [`ResolvedReuseIds`] instead, so the orchestrator never has to look at the
//! intent's create/reuse choices again.

use common::ResourceId;
use serde::{Deserialize, Serialize};

use crate::client::{InitiatorGroupRequest, PortalRequest, VolumeRequest};
use crate::error::PlanError;
use crate::intent::{
    DeviceSource, ExtentKind, ExtentOptions, FibreChannelPortSpec, InitiatorGroupSpec,
    PortalSpec, ProvisioningIntent, TargetMode, TargetSpec,
};
use crate::resource::ResourceKind;

/// Kind of a plan step. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateVolume,
    CreateExtent,
    CreatePortal,
    CreateInitiatorGroup,
    CreateTarget,
    LinkTargetExtent,
    LinkFibreChannelPort,
}

impl StepKind {
    /// Every step kind, in execution order.
    pub const ORDER: [StepKind; 7] = [
        StepKind::CreateVolume,
        StepKind::CreateExtent,
        StepKind::CreatePortal,
        StepKind::CreateInitiatorGroup,
        StepKind::CreateTarget,
        StepKind::LinkTargetExtent,
        StepKind::LinkFibreChannelPort,
    ];

    /// The resource kind this step creates, if it creates a deletable one.
    pub fn creates(&self) -> Option<ResourceKind> {
        match self {
            StepKind::CreateVolume => Some(ResourceKind::Volume),
            StepKind::CreateExtent => Some(ResourceKind::Extent),
            StepKind::CreatePortal => Some(ResourceKind::Portal),
            StepKind::CreateInitiatorGroup => Some(ResourceKind::InitiatorGroup),
            StepKind::CreateTarget => Some(ResourceKind::Target),
            StepKind::LinkTargetExtent => Some(ResourceKind::TargetExtentLink),
            StepKind::LinkFibreChannelPort => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::CreateVolume => "create_volume",
            StepKind::CreateExtent => "create_extent",
            StepKind::CreatePortal => "create_portal",
            StepKind::CreateInitiatorGroup => "create_initiator_group",
            StepKind::CreateTarget => "create_target",
            StepKind::LinkTargetExtent => "link_target_extent",
            StepKind::LinkFibreChannelPort => "link_fibre_channel_port",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing of the extent to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentBacking {
    /// Block device: the volume created by this run, or the reused disk.
    Device,
    File { path: String, size_bytes: u64 },
}

/// Extent step payload. The device reference is resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtentStep {
    pub name: String,
    pub backing: ExtentBacking,
    pub options: ExtentOptions,
}

/// Target step payload. Portal and initiator group are resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStep {
    pub name: String,
    pub alias: Option<String>,
    pub mode: TargetMode,
}

/// A single step of a plan with the payload it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Step {
    CreateVolume(VolumeRequest),
    CreateExtent(ExtentStep),
    CreatePortal(PortalRequest),
    CreateInitiatorGroup(InitiatorGroupRequest),
    CreateTarget(TargetStep),
    LinkTargetExtent,
    LinkFibreChannelPort(FibreChannelPortSpec),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::CreateVolume(_) => StepKind::CreateVolume,
            Step::CreateExtent(_) => StepKind::CreateExtent,
            Step::CreatePortal(_) => StepKind::CreatePortal,
            Step::CreateInitiatorGroup(_) => StepKind::CreateInitiatorGroup,
            Step::CreateTarget(_) => StepKind::CreateTarget,
            Step::LinkTargetExtent => StepKind::LinkTargetExtent,
            Step::LinkFibreChannelPort(_) => StepKind::LinkFibreChannelPort,
        }
    }
}

/// Ids of resources the operator chose to reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedReuseIds {
    /// Existing disk reference for a device extent.
    pub disk: Option<String>,
    pub portal: Option<ResourceId>,
    pub initiator_group: Option<ResourceId>,
    pub target: Option<ResourceId>,
}

/// Ordered steps for one provisioning run.
///
/// Only [`build_plan`] constructs a plan, so step order always follows
/// [`StepKind::ORDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepPlan {
    steps: Vec<Step>,
}

impl StepPlan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(Step::kind).collect()
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.steps.iter().any(|step| step.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds the step plan for an intent.
///
/// Pure: performs no I/O. Structural problems are reported as [`PlanError`]
/// before any step exists.
pub fn build_plan(
    intent: &ProvisioningIntent,
) -> Result<(StepPlan, ResolvedReuseIds), PlanError> {
    validate(intent)?;

    let mut steps = Vec::with_capacity(StepKind::ORDER.len());
    let mut resolved = ResolvedReuseIds::default();
    let extent = &intent.extent;

    let backing = match &extent.kind {
        ExtentKind::Device(DeviceSource::NewVolume {
            dataset_path,
            volume_size_bytes,
        }) => {
            steps.push(Step::CreateVolume(VolumeRequest {
                name: extent.name.clone(),
                dataset_path: dataset_path.clone(),
                size_bytes: *volume_size_bytes,
            }));
            ExtentBacking::Device
        }
        ExtentKind::Device(DeviceSource::Existing { disk }) => {
            resolved.disk = Some(disk.clone());
            ExtentBacking::Device
        }
        ExtentKind::File {
            path,
            file_size_bytes,
        } => ExtentBacking::File {
            path: path.clone(),
            size_bytes: *file_size_bytes,
        },
    };

    steps.push(Step::CreateExtent(ExtentStep {
        name: extent.name.clone(),
        backing,
        options: extent.options.clone(),
    }));

    match &intent.portal {
        Some(PortalSpec::Reuse(id)) => resolved.portal = Some(id.clone()),
        Some(PortalSpec::CreateNew { listen, comment }) => {
            steps.push(Step::CreatePortal(PortalRequest {
                listen: listen.clone(),
                comment: comment.clone(),
            }));
        }
        None => {}
    }

    match &intent.initiator_group {
        InitiatorGroupSpec::Reuse(id) => resolved.initiator_group = Some(id.clone()),
        InitiatorGroupSpec::Unrestricted => {}
        InitiatorGroupSpec::CreateNew {
            allowed_initiators,
            comment,
        } => {
            steps.push(Step::CreateInitiatorGroup(InitiatorGroupRequest {
                allowed_initiators: allowed_initiators.clone(),
                comment: comment.clone(),
            }));
        }
    }

    match &intent.target {
        TargetSpec::Reuse(id) => resolved.target = Some(id.clone()),
        TargetSpec::CreateNew { alias } => {
            steps.push(Step::CreateTarget(TargetStep {
                name: extent.name.clone(),
                alias: alias.clone(),
                mode: intent.target_mode,
            }));
        }
    }

    steps.push(Step::LinkTargetExtent);

    if let Some(port) = &intent.fibre_channel_port {
        steps.push(Step::LinkFibreChannelPort(port.clone()));
    }

    Ok((StepPlan { steps }, resolved))
}

fn validate(intent: &ProvisioningIntent) -> Result<(), PlanError> {
    let has_group = intent.initiator_group != InitiatorGroupSpec::Unrestricted;

    match intent.target_mode {
        TargetMode::FibreChannel => {
            if intent.portal.is_some() {
                return Err(PlanError::PortalNotAllowed);
            }
            if has_group {
                return Err(PlanError::InitiatorGroupNotAllowed);
            }
            if intent.fibre_channel_port.is_none() {
                return Err(PlanError::MissingFibreChannelPort);
            }
        }
        TargetMode::Iscsi => {
            if intent.fibre_channel_port.is_some() {
                return Err(PlanError::FibreChannelPortNotAllowed);
            }
        }
    }

    match intent.target {
        TargetSpec::Reuse(_) if intent.portal.is_some() || has_group => {
            Err(PlanError::GroupsWithReusedTarget)
        }
        TargetSpec::CreateNew { .. }
            if intent.target_mode == TargetMode::Iscsi && intent.portal.is_none() =>
        {
            Err(PlanError::MissingPortal)
        }
        _ => Ok(()),
    }
}
