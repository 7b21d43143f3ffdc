//! Kinds of remote resources a run can create.

use common::ResourceId;
use serde::{Deserialize, Serialize};

/// A remote resource kind that has a matching delete operation.
///
/// The Fibre Channel port association has no delete on the control plane and
/// is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Volume,
    Extent,
    Portal,
    InitiatorGroup,
    Target,
    TargetExtentLink,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Extent => "extent",
            ResourceKind::Portal => "portal",
            ResourceKind::InitiatorGroup => "initiator_group",
            ResourceKind::Target => "target",
            ResourceKind::TargetExtentLink => "target_extent_link",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource created by the current run, in the order it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl CreatedResource {
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
