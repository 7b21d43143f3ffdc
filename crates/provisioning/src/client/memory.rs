//! In-memory control plane for tests and local runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::ResourceId;

use super::{
    ExtentRequest, InitiatorGroupRequest, PortLinkRequest, PortalRequest, ResourceClient,
    TargetExtentLinkRequest, TargetRequest, VolumeRequest,
};
use crate::error::ClientError;
use crate::resource::ResourceKind;

/// A [`ResourceClient`] operation, used for failure injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateVolume,
    DeleteVolume,
    CreateExtent,
    DeleteExtent,
    CreatePortal,
    DeletePortal,
    CreateInitiatorGroup,
    DeleteInitiatorGroup,
    CreateTarget,
    DeleteTarget,
    CreateTargetExtentLink,
    DeleteTargetExtentLink,
    LinkPortToTarget,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateVolume => "create_volume",
            Operation::DeleteVolume => "delete_volume",
            Operation::CreateExtent => "create_extent",
            Operation::DeleteExtent => "delete_extent",
            Operation::CreatePortal => "create_portal",
            Operation::DeletePortal => "delete_portal",
            Operation::CreateInitiatorGroup => "create_initiator_group",
            Operation::DeleteInitiatorGroup => "delete_initiator_group",
            Operation::CreateTarget => "create_target",
            Operation::DeleteTarget => "delete_target",
            Operation::CreateTargetExtentLink => "create_target_extent_link",
            Operation::DeleteTargetExtentLink => "delete_target_extent_link",
            Operation::LinkPortToTarget => "link_port_to_target",
        }
    }
}

/// One call received by the in-memory client. Deletes carry the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCall {
    pub operation: Operation,
    pub id: Option<ResourceId>,
}

impl ClientCall {
    pub fn create(operation: Operation) -> Self {
        Self {
            operation,
            id: None,
        }
    }

    pub fn delete(operation: Operation, id: impl Into<ResourceId>) -> Self {
        Self {
            operation,
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryControlPlane {
    volumes: BTreeMap<ResourceId, VolumeRequest>,
    extents: BTreeMap<ResourceId, ExtentRequest>,
    portals: BTreeMap<ResourceId, PortalRequest>,
    initiator_groups: BTreeMap<ResourceId, InitiatorGroupRequest>,
    targets: BTreeMap<ResourceId, TargetRequest>,
    target_extent_links: BTreeMap<ResourceId, TargetExtentLinkRequest>,
    port_links: Vec<PortLinkRequest>,
    next_id: u64,
    failing: HashSet<Operation>,
    calls: Vec<ClientCall>,
}

impl InMemoryControlPlane {
    fn allocate_id(&mut self) -> ResourceId {
        self.next_id += 1;
        ResourceId::from(self.next_id)
    }
}

/// In-memory control plane.
///
/// Enforces unique names for volumes, extents and targets, so a second run
/// with the same intent only succeeds once the first run's resources are
/// gone. Any operation can be made to fail with [`fail_on`](Self::fail_on).
/// Deleting an unknown id succeeds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceClient {
    state: Arc<Mutex<InMemoryControlPlane>>,
}

impl InMemoryResourceClient {
    /// Creates an empty in-memory control plane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.lock().failing.insert(operation);
    }

    /// Stops failing `operation`.
    pub fn clear_failure(&self, operation: Operation) {
        self.lock().failing.remove(&operation);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.lock().calls.clone()
    }

    /// The operation of every call received so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|call| call.operation).collect()
    }

    /// Number of live resources of `kind`.
    pub fn count(&self, kind: ResourceKind) -> usize {
        let state = self.lock();
        match kind {
            ResourceKind::Volume => state.volumes.len(),
            ResourceKind::Extent => state.extents.len(),
            ResourceKind::Portal => state.portals.len(),
            ResourceKind::InitiatorGroup => state.initiator_groups.len(),
            ResourceKind::Target => state.targets.len(),
            ResourceKind::TargetExtentLink => state.target_extent_links.len(),
        }
    }

    /// Number of live resources of every kind together.
    pub fn resource_count(&self) -> usize {
        let state = self.lock();
        state.volumes.len()
            + state.extents.len()
            + state.portals.len()
            + state.initiator_groups.len()
            + state.targets.len()
            + state.target_extent_links.len()
    }

    /// Returns the stored target, if it exists.
    pub fn target(&self, id: &ResourceId) -> Option<TargetRequest> {
        self.lock().targets.get(id).cloned()
    }

    /// Returns the stored extent, if it exists.
    pub fn extent(&self, id: &ResourceId) -> Option<ExtentRequest> {
        self.lock().extents.get(id).cloned()
    }

    /// Fibre Channel port bindings made so far.
    pub fn port_links(&self) -> Vec<PortLinkRequest> {
        self.lock().port_links.clone()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryControlPlane> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logs the call and applies failure injection.
    fn begin(
        &self,
        operation: Operation,
        id: Option<&ResourceId>,
    ) -> Result<MutexGuard<'_, InMemoryControlPlane>, ClientError> {
        let mut state = self.lock();
        state.calls.push(ClientCall {
            operation,
            id: id.cloned(),
        });

        if state.failing.contains(&operation) {
            return Err(ClientError::Rejected {
                operation: operation.as_str(),
                message: "injected failure".to_string(),
            });
        }

        Ok(state)
    }
}

#[async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn create_volume(&self, request: VolumeRequest) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreateVolume, None)?;
        let id = ResourceId::new(request.full_name());

        if state.volumes.contains_key(&id) {
            return Err(ClientError::Conflict {
                kind: ResourceKind::Volume,
                name: id.to_string(),
            });
        }

        state.volumes.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_volume(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeleteVolume, Some(id))?;
        state.volumes.remove(id);
        Ok(())
    }

    async fn create_extent(&self, request: ExtentRequest) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreateExtent, None)?;

        if state.extents.values().any(|e| e.name == request.name) {
            return Err(ClientError::Conflict {
                kind: ResourceKind::Extent,
                name: request.name,
            });
        }

        let id = state.allocate_id();
        state.extents.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_extent(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeleteExtent, Some(id))?;
        state.extents.remove(id);
        state.target_extent_links.retain(|_, link| &link.extent != id);
        Ok(())
    }

    async fn create_portal(&self, request: PortalRequest) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreatePortal, None)?;
        let id = state.allocate_id();
        state.portals.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_portal(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeletePortal, Some(id))?;
        state.portals.remove(id);
        Ok(())
    }

    async fn create_initiator_group(
        &self,
        request: InitiatorGroupRequest,
    ) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreateInitiatorGroup, None)?;
        let id = state.allocate_id();
        state.initiator_groups.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_initiator_group(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeleteInitiatorGroup, Some(id))?;
        state.initiator_groups.remove(id);
        Ok(())
    }

    async fn create_target(&self, request: TargetRequest) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreateTarget, None)?;

        if state.targets.values().any(|t| t.name == request.name) {
            return Err(ClientError::Conflict {
                kind: ResourceKind::Target,
                name: request.name,
            });
        }

        let id = state.allocate_id();
        state.targets.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_target(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeleteTarget, Some(id))?;
        state.targets.remove(id);
        Ok(())
    }

    async fn create_target_extent_link(
        &self,
        request: TargetExtentLinkRequest,
    ) -> Result<ResourceId, ClientError> {
        let mut state = self.begin(Operation::CreateTargetExtentLink, None)?;
        let id = state.allocate_id();
        state.target_extent_links.insert(id.clone(), request);
        Ok(id)
    }

    async fn delete_target_extent_link(&self, id: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::DeleteTargetExtentLink, Some(id))?;
        state.target_extent_links.remove(id);
        Ok(())
    }

    async fn link_port_to_target(&self, request: PortLinkRequest) -> Result<(), ClientError> {
        let mut state = self.begin(Operation::LinkPortToTarget, None)?;
        state.port_links.push(request);
        Ok(())
    }
}
