//! Resource client trait, request payloads, and client implementations.
//!
//! The orchestrator only talks to the control plane through [`ResourceClient`].
//! Each create returns the id the control plane assigned; each delete is
//! attempted once and its error is reported, never retried.

pub mod http;
pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;
use common::ResourceId;
use serde::Serialize;

use crate::error::ClientError;
use crate::intent::TargetMode;

pub use http::{HttpClientConfig, HttpResourceClient};
pub use memory::{ClientCall, InMemoryResourceClient, Operation};

/// Payload for creating a block volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRequest {
    pub name: String,
    pub dataset_path: String,
    pub size_bytes: u64,
}

impl VolumeRequest {
    /// Full dataset name of the volume, which is also its remote id.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.dataset_path.trim_end_matches('/'), self.name)
    }
}

/// Backing storage of an extent as sent to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentSource {
    Disk { disk: String },
    File { path: String, size_bytes: u64 },
}

/// Payload for creating an extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtentRequest {
    pub name: String,
    pub source: ExtentSource,
    pub blocksize: u32,
    pub read_only: bool,
    pub insecure_tpc: bool,
    pub xen: bool,
    pub comment: Option<String>,
}

/// Payload for creating a portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalRequest {
    pub listen: Vec<IpAddr>,
    pub comment: Option<String>,
}

/// Payload for creating an initiator group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiatorGroupRequest {
    pub allowed_initiators: Vec<String>,
    pub comment: Option<String>,
}

/// Portal / initiator group pairing attached to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    pub portal: ResourceId,
    pub initiator_group: Option<ResourceId>,
}

/// Payload for creating a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRequest {
    pub name: String,
    pub alias: Option<String>,
    pub mode: TargetMode,
    pub groups: Vec<TargetGroup>,
}

/// Payload for associating an extent with a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetExtentLinkRequest {
    pub target: ResourceId,
    pub extent: ResourceId,
}

/// Payload for binding a Fibre Channel port to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortLinkRequest {
    pub target: ResourceId,
    pub port: String,
    pub host_id: u32,
}

/// Operations the orchestrator needs from the remote control plane.
///
/// Implementations must be safe to share between concurrent runs.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create_volume(&self, request: VolumeRequest) -> Result<ResourceId, ClientError>;

    /// Deletes a volume recursively and forcibly.
    async fn delete_volume(&self, id: &ResourceId) -> Result<(), ClientError>;

    async fn create_extent(&self, request: ExtentRequest) -> Result<ResourceId, ClientError>;

    /// Deletes an extent forcibly, purging any target-extent links to it.
    /// The backing storage is left in place.
    async fn delete_extent(&self, id: &ResourceId) -> Result<(), ClientError>;

    async fn create_portal(&self, request: PortalRequest) -> Result<ResourceId, ClientError>;

    async fn delete_portal(&self, id: &ResourceId) -> Result<(), ClientError>;

    async fn create_initiator_group(
        &self,
        request: InitiatorGroupRequest,
    ) -> Result<ResourceId, ClientError>;

    async fn delete_initiator_group(&self, id: &ResourceId) -> Result<(), ClientError>;

    async fn create_target(&self, request: TargetRequest) -> Result<ResourceId, ClientError>;

    async fn delete_target(&self, id: &ResourceId) -> Result<(), ClientError>;

    async fn create_target_extent_link(
        &self,
        request: TargetExtentLinkRequest,
    ) -> Result<ResourceId, ClientError>;

    async fn delete_target_extent_link(&self, id: &ResourceId) -> Result<(), ClientError>;

    /// Binds a Fibre Channel port to a target. There is no inverse operation.
    async fn link_port_to_target(&self, request: PortLinkRequest) -> Result<(), ClientError>;
}
