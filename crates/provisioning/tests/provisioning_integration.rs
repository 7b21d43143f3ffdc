//! Integration tests for the provisioning orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use provisioning::client::{
    ExtentRequest, InitiatorGroupRequest, PortLinkRequest, PortalRequest, TargetExtentLinkRequest,
    TargetRequest, VolumeRequest,
};
use provisioning::{
    CancelHandle, CancelSignal, ClientCall, ClientError, ExtentSpec, FibreChannelPortSpec,
    InMemoryResourceClient, InitiatorGroupSpec, Operation, PlanError, PortalSpec, ProvisionError,
    ProvisioningIntent, ProvisioningOrchestrator, ResourceClient, ResourceKind, RunState, StepKind,
    TargetSpec, build_plan,
};

const GIB: u64 = 1024 * 1024 * 1024;

struct TestHarness {
    orchestrator: ProvisioningOrchestrator,
    client: InMemoryResourceClient,
}

impl TestHarness {
    fn new() -> Self {
        let client = InMemoryResourceClient::new();
        let orchestrator = ProvisioningOrchestrator::new(Arc::new(client.clone()));
        Self {
            orchestrator,
            client,
        }
    }

    fn deletes(&self) -> Vec<ClientCall> {
        self.client
            .calls()
            .into_iter()
            .filter(|call| call.id.is_some())
            .collect()
    }
}

/// New volume, new portal on 0.0.0.0, no initiator group.
fn scenario_a() -> ProvisioningIntent {
    ProvisioningIntent::iscsi(ExtentSpec::new_volume("vol1", "tank", 10 * GIB)).with_portal(
        PortalSpec::CreateNew {
            listen: vec!["0.0.0.0".parse().unwrap()],
            comment: None,
        },
    )
}

fn fc_port() -> FibreChannelPortSpec {
    FibreChannelPortSpec {
        port: "fc0".to_string(),
        host_id: 0,
    }
}

#[tokio::test]
async fn test_scenario_a_creates_every_resource() {
    let harness = TestHarness::new();
    let (plan, resolved) = build_plan(&scenario_a()).unwrap();

    let outcome = harness
        .orchestrator
        .execute(&plan, &resolved, &CancelSignal::never())
        .await;
    let result = outcome.result.unwrap();

    let kinds: Vec<ResourceKind> = outcome.run.created().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Volume,
            ResourceKind::Extent,
            ResourceKind::Portal,
            ResourceKind::Target,
            ResourceKind::TargetExtentLink,
        ]
    );
    assert_eq!(result.volume_id, Some(ResourceId::new("tank/vol1")));
    assert!(result.portal_id.is_some());
    assert!(result.initiator_group_id.is_none());
    assert!(harness.deletes().is_empty());
    assert_eq!(harness.client.resource_count(), 5);
}

#[tokio::test]
async fn test_scenario_b_link_failure_rolls_back_four_resources() {
    let harness = TestHarness::new();
    harness.client.fail_on(Operation::CreateTargetExtentLink);

    let (plan, resolved) = build_plan(&scenario_a()).unwrap();
    let outcome = harness
        .orchestrator
        .execute(&plan, &resolved, &CancelSignal::never())
        .await;

    assert_eq!(outcome.run.created().len(), 4);
    assert_eq!(outcome.run.state(), RunState::Failed);

    let created = outcome.run.created().to_vec();
    let expected: Vec<ClientCall> = vec![
        ClientCall::delete(Operation::DeleteTarget, created[3].id.clone()),
        ClientCall::delete(Operation::DeletePortal, created[2].id.clone()),
        ClientCall::delete(Operation::DeleteExtent, created[1].id.clone()),
        ClientCall::delete(Operation::DeleteVolume, created[0].id.clone()),
    ];
    assert_eq!(harness.deletes(), expected);

    match outcome.result.unwrap_err() {
        ProvisionError::StepFailed { kind, rollback, .. } => {
            assert_eq!(kind, StepKind::LinkTargetExtent);
            assert!(rollback.is_clean());
            assert_eq!(rollback.attempted.len(), 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.client.resource_count(), 0);
}

#[tokio::test]
async fn test_scenario_c_reused_portal_and_group_keep_their_ids() {
    let harness = TestHarness::new();
    let intent = ProvisioningIntent::iscsi(ExtentSpec::existing_disk("lun1", "zvol/tank/lun1"))
        .with_portal(PortalSpec::Reuse(ResourceId::new("7")))
        .with_initiator_group(InitiatorGroupSpec::Reuse(ResourceId::new("9")));

    let (plan, _) = build_plan(&intent).unwrap();
    assert_eq!(
        plan.kinds(),
        vec![
            StepKind::CreateExtent,
            StepKind::CreateTarget,
            StepKind::LinkTargetExtent,
        ]
    );

    let result = harness.orchestrator.provision(&intent).await.unwrap();

    assert_eq!(result.portal_id, Some(ResourceId::new("7")));
    assert_eq!(result.initiator_group_id, Some(ResourceId::new("9")));
    let target = harness.client.target(&result.target_id).unwrap();
    assert_eq!(target.groups[0].portal, ResourceId::new("7"));
    assert_eq!(target.groups[0].initiator_group, Some(ResourceId::new("9")));
    assert_eq!(harness.client.count(ResourceKind::Portal), 0);
}

#[tokio::test]
async fn test_failure_at_each_step_deletes_prefix_in_reverse() {
    let intent = scenario_a().with_initiator_group(InitiatorGroupSpec::CreateNew {
        allowed_initiators: vec!["iqn.1993-08.org.debian:01:host".to_string()],
        comment: None,
    });
    let failures = [
        Operation::CreateVolume,
        Operation::CreateExtent,
        Operation::CreatePortal,
        Operation::CreateInitiatorGroup,
        Operation::CreateTarget,
        Operation::CreateTargetExtentLink,
    ];

    for (n, operation) in failures.into_iter().enumerate() {
        let harness = TestHarness::new();
        harness.client.fail_on(operation);

        let (plan, resolved) = build_plan(&intent).unwrap();
        let outcome = harness
            .orchestrator
            .execute(&plan, &resolved, &CancelSignal::never())
            .await;

        let created = outcome.run.created().to_vec();
        assert_eq!(created.len(), n, "failing {}", operation.as_str());

        let deleted: Vec<ResourceId> = harness
            .deletes()
            .into_iter()
            .filter_map(|call| call.id)
            .collect();
        let expected: Vec<ResourceId> = created.iter().rev().map(|r| r.id.clone()).collect();
        assert_eq!(deleted, expected, "failing {}", operation.as_str());
        assert_eq!(harness.client.resource_count(), 0);
    }
}

#[tokio::test]
async fn test_reused_resources_are_never_deleted() {
    let harness = TestHarness::new();
    harness.client.fail_on(Operation::CreateTargetExtentLink);
    let intent = ProvisioningIntent::iscsi(ExtentSpec::file("lun2", "/mnt/tank/lun2", GIB))
        .with_target(TargetSpec::Reuse(ResourceId::new("4")));

    let err = harness.orchestrator.provision(&intent).await.unwrap_err();

    let report = err.rollback_report().unwrap();
    assert_eq!(report.attempted.len(), 1);
    assert_eq!(report.attempted[0].kind, ResourceKind::Extent);
    assert!(
        !harness
            .client
            .operations()
            .contains(&Operation::DeleteTarget)
    );
}

#[tokio::test]
async fn test_failed_delete_is_reported_as_orphan() {
    let harness = TestHarness::new();
    harness.client.fail_on(Operation::CreateTargetExtentLink);
    harness.client.fail_on(Operation::DeletePortal);

    let err = harness
        .orchestrator
        .provision(&scenario_a())
        .await
        .unwrap_err();

    let orphans = err.orphans();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].kind, ResourceKind::Portal);

    // Deletes after the failed one were still attempted.
    let operations = harness.client.operations();
    assert!(operations.contains(&Operation::DeleteExtent));
    assert!(operations.contains(&Operation::DeleteVolume));
    assert_eq!(harness.client.resource_count(), 1);
    assert_eq!(harness.client.count(ResourceKind::Portal), 1);
}

#[tokio::test]
async fn test_rerun_after_rollback_is_independent() {
    let harness = TestHarness::new();
    harness.client.fail_on(Operation::CreateTarget);

    let (plan, resolved) = build_plan(&scenario_a()).unwrap();
    let first = harness
        .orchestrator
        .execute(&plan, &resolved, &CancelSignal::never())
        .await;
    let first_kinds: Vec<ResourceKind> = first.run.created().iter().map(|r| r.kind).collect();
    assert_eq!(
        first_kinds,
        vec![ResourceKind::Volume, ResourceKind::Extent, ResourceKind::Portal]
    );
    let first_error = first.result.as_ref().unwrap_err();
    let rolled_back: Vec<_> = first_error.rollback_report().unwrap().attempted.clone();
    let mut expected = first.run.created().to_vec();
    expected.reverse();
    assert_eq!(rolled_back, expected);
    assert_eq!(harness.client.resource_count(), 0);

    harness.client.clear_failure(Operation::CreateTarget);
    let second = harness
        .orchestrator
        .execute(&plan, &resolved, &CancelSignal::never())
        .await;

    assert!(second.result.is_ok());
    assert_ne!(first.run.id(), second.run.id());
    assert_eq!(second.run.created().len(), 5);
    assert_eq!(
        second.run.events().first().map(|e| e.event_type()),
        Some("RunStarted")
    );
}

#[tokio::test]
async fn test_iscsi_with_fibre_channel_port_is_rejected_without_calls() {
    let harness = TestHarness::new();
    let intent = scenario_a().with_fibre_channel_port(fc_port());

    let err = harness.orchestrator.provision(&intent).await.unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::PlanInvalid(PlanError::FibreChannelPortNotAllowed)
    ));
    assert!(harness.client.calls().is_empty());
}

#[tokio::test]
async fn test_fibre_channel_with_portal_is_rejected_without_calls() {
    let harness = TestHarness::new();
    let intent = ProvisioningIntent::fibre_channel(
        ExtentSpec::existing_disk("fc-lun", "zvol/tank/fc"),
        fc_port(),
    )
    .with_portal(PortalSpec::Reuse(ResourceId::new("1")));

    let err = harness.orchestrator.provision(&intent).await.unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::PlanInvalid(PlanError::PortalNotAllowed)
    ));
    assert!(harness.client.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_before_start_makes_no_calls() {
    let harness = TestHarness::new();
    let (handle, signal) = CancelSignal::pair();
    handle.cancel();

    let err = harness
        .orchestrator
        .provision_with_cancel(&scenario_a(), &signal)
        .await
        .unwrap_err();

    match err {
        ProvisionError::Cancelled {
            completed,
            rollback,
        } => {
            assert_eq!(completed, 0);
            assert!(rollback.attempted.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.client.calls().is_empty());
}

/// Delegates to the in-memory client and cancels once an extent exists.
struct CancelAfterExtent {
    inner: InMemoryResourceClient,
    handle: CancelHandle,
}

#[async_trait]
impl ResourceClient for CancelAfterExtent {
    async fn create_volume(&self, request: VolumeRequest) -> Result<ResourceId, ClientError> {
        self.inner.create_volume(request).await
    }

    async fn delete_volume(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_volume(id).await
    }

    async fn create_extent(&self, request: ExtentRequest) -> Result<ResourceId, ClientError> {
        let id = self.inner.create_extent(request).await?;
        self.handle.cancel();
        Ok(id)
    }

    async fn delete_extent(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_extent(id).await
    }

    async fn create_portal(&self, request: PortalRequest) -> Result<ResourceId, ClientError> {
        self.inner.create_portal(request).await
    }

    async fn delete_portal(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_portal(id).await
    }

    async fn create_initiator_group(
        &self,
        request: InitiatorGroupRequest,
    ) -> Result<ResourceId, ClientError> {
        self.inner.create_initiator_group(request).await
    }

    async fn delete_initiator_group(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_initiator_group(id).await
    }

    async fn create_target(&self, request: TargetRequest) -> Result<ResourceId, ClientError> {
        self.inner.create_target(request).await
    }

    async fn delete_target(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_target(id).await
    }

    async fn create_target_extent_link(
        &self,
        request: TargetExtentLinkRequest,
    ) -> Result<ResourceId, ClientError> {
        self.inner.create_target_extent_link(request).await
    }

    async fn delete_target_extent_link(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.inner.delete_target_extent_link(id).await
    }

    async fn link_port_to_target(&self, request: PortLinkRequest) -> Result<(), ClientError> {
        self.inner.link_port_to_target(request).await
    }
}

#[tokio::test]
async fn test_cancel_between_steps_rolls_back_completed_steps() {
    let inner = InMemoryResourceClient::new();
    let (handle, signal) = CancelSignal::pair();
    let orchestrator = ProvisioningOrchestrator::new(Arc::new(CancelAfterExtent {
        inner: inner.clone(),
        handle,
    }));

    let (plan, resolved) = build_plan(&scenario_a()).unwrap();
    let outcome = orchestrator.execute(&plan, &resolved, &signal).await;

    match outcome.result.unwrap_err() {
        ProvisionError::Cancelled {
            completed,
            rollback,
        } => {
            assert_eq!(completed, 2);
            assert_eq!(
                rollback.attempted.iter().map(|r| r.kind).collect::<Vec<_>>(),
                vec![ResourceKind::Extent, ResourceKind::Volume]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(outcome.run.state(), RunState::Failed);
    assert!(!inner.operations().contains(&Operation::CreatePortal));
    assert_eq!(inner.resource_count(), 0);
}
