//! Provisioning orchestrator.

use std::sync::Arc;
use std::time::Instant;

use common::{ResourceId, RunId};

use crate::cancel::CancelSignal;
use crate::client::{
    ExtentRequest, ExtentSource, PortLinkRequest, ResourceClient, TargetExtentLinkRequest,
    TargetGroup, TargetRequest,
};
use crate::error::{ProvisionError, Result, StepError};
use crate::events::RunEvent;
use crate::intent::ProvisioningIntent;
use crate::plan::{
    ExtentBacking, ExtentStep, ResolvedReuseIds, Step, StepKind, StepPlan, TargetStep, build_plan,
};
use crate::resource::{CreatedResource, ResourceKind};
use crate::result::ProvisioningResult;
use crate::rollback::{RollbackReport, rollback};
use crate::run::ProvisioningRun;

/// Prefix the control plane expects in front of a volume id when it is used
/// as an extent's disk.
pub const ZVOL_DISK_PREFIX: &str = "zvol/";

/// A finished run together with its result.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: ProvisioningRun,
    pub result: Result<ProvisioningResult>,
}

/// Why a run stopped before producing a result.
enum Failure {
    Step { kind: StepKind, cause: StepError },
    Cancelled,
    Incomplete(ResourceKind),
}

/// Creates compound targets step by step, rolling back on failure.
///
/// Steps run strictly one after another because later payloads reference
/// ids produced by earlier steps. Every resource a run creates is recorded
/// in its [`ProvisioningRun`]; when a step fails (or the run is cancelled
/// between steps) exactly those resources are deleted, newest first, and the
/// original error is returned with the rollback report attached.
#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    client: Arc<dyn ResourceClient>,
}

impl ProvisioningOrchestrator {
    /// Creates an orchestrator backed by the given control plane client.
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Plans and provisions everything the intent asks for.
    pub async fn provision(
        &self,
        intent: &ProvisioningIntent,
    ) -> Result<ProvisioningResult> {
        self.provision_with_cancel(intent, &CancelSignal::never())
            .await
    }

    /// Like [`provision`](Self::provision), checking `cancel` between steps.
    pub async fn provision_with_cancel(
        &self,
        intent: &ProvisioningIntent,
        cancel: &CancelSignal,
    ) -> Result<ProvisioningResult> {
        let (plan, resolved) = build_plan(intent)?;
        self.run(&plan, &resolved, cancel).await
    }

    /// Executes a plan and returns only its result.
    pub async fn run(
        &self,
        plan: &StepPlan,
        resolved: &ResolvedReuseIds,
        cancel: &CancelSignal,
    ) -> Result<ProvisioningResult> {
        self.execute(plan, resolved, cancel).await.result
    }

    /// Executes a plan and returns the finished run with its result.
    #[tracing::instrument(skip_all, fields(run_id = tracing::field::Empty, steps = plan.len()))]
    pub async fn execute(
        &self,
        plan: &StepPlan,
        resolved: &ResolvedReuseIds,
        cancel: &CancelSignal,
    ) -> RunOutcome {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let mut run = ProvisioningRun::new(run_id);

        if cancel.is_cancelled() {
            tracing::info!("run cancelled before its first step");
            run.record(RunEvent::cancelled(0));
            let error = ProvisionError::Cancelled {
                completed: 0,
                rollback: RollbackReport::default(),
            };
            return RunOutcome {
                run,
                result: Err(error),
            };
        }

        metrics::counter!("provisioning_runs_total").increment(1);
        let run_start = Instant::now();
        run.record(RunEvent::run_started(run_id, plan.kinds()));

        let mut fibre_channel_linked = false;
        let mut failure = None;

        for (index, step) in plan.steps().iter().enumerate() {
            if index > 0 && cancel.is_cancelled() {
                tracing::info!(completed = run.completed_steps(), "run cancelled between steps");
                run.record(RunEvent::cancelled(run.completed_steps()));
                failure = Some(Failure::Cancelled);
                break;
            }

            let kind = step.kind();
            tracing::info!(step = %kind, index, "provisioning step started");
            run.record(RunEvent::step_started(index, kind));

            match self.execute_step(step, &run, resolved).await {
                Ok(resource) => {
                    if kind == StepKind::LinkFibreChannelPort {
                        fibre_channel_linked = true;
                    }
                    if let Some(resource) = &resource {
                        tracing::info!(step = %kind, id = %resource.id, "provisioning step completed");
                    }
                    run.record(RunEvent::step_completed(index, kind, resource));
                }
                Err(cause) => {
                    tracing::warn!(step = %kind, error = %cause, "provisioning step failed");
                    run.record(RunEvent::step_failed(index, kind, cause.to_string()));
                    failure = Some(Failure::Step { kind, cause });
                    break;
                }
            }
        }

        let failure = match failure {
            Some(failure) => failure,
            None => match ProvisioningResult::assemble(&run, resolved, fibre_channel_linked) {
                Ok(result) => {
                    run.record(RunEvent::run_succeeded());
                    let duration = run_start.elapsed().as_secs_f64();
                    metrics::histogram!("provisioning_duration_seconds").record(duration);
                    metrics::counter!("provisioning_succeeded").increment(1);
                    tracing::info!(target_id = %result.target_id, duration, "provisioning completed");
                    return RunOutcome {
                        run,
                        result: Ok(result),
                    };
                }
                Err(missing) => Failure::Incomplete(missing),
            },
        };

        let error = self.roll_back(&mut run, failure).await;
        metrics::histogram!("provisioning_duration_seconds")
            .record(run_start.elapsed().as_secs_f64());
        metrics::counter!("provisioning_failed").increment(1);

        RunOutcome {
            run,
            result: Err(error),
        }
    }

    /// Deletes everything the run created and builds the error to return.
    async fn roll_back(&self, run: &mut ProvisioningRun, failure: Failure) -> ProvisionError {
        let created = run.created().to_vec();
        run.record(RunEvent::rollback_started(created.len()));

        let report = rollback(&created, self.client.as_ref()).await;

        for resource in &report.attempted {
            let failed = report
                .failures
                .iter()
                .find(|f| f.kind == resource.kind && f.id == resource.id);
            match failed {
                Some(f) => {
                    run.record(RunEvent::delete_failed(f.kind, f.id.clone(), f.error.clone()))
                }
                None => run.record(RunEvent::resource_deleted(resource.clone())),
            }
        }

        if !report.is_clean() {
            let orphans: Vec<String> = report.orphans().iter().map(ToString::to_string).collect();
            tracing::error!(?orphans, "rollback left resources behind, manual cleanup required");
        }

        let error = match failure {
            Failure::Step { kind, cause } => ProvisionError::StepFailed {
                kind,
                cause,
                rollback: report,
            },
            Failure::Cancelled => ProvisionError::Cancelled {
                completed: run.completed_steps(),
                rollback: report,
            },
            Failure::Incomplete(missing) => ProvisionError::Incomplete {
                missing,
                rollback: report,
            },
        };

        run.record(RunEvent::run_failed(error.to_string()));
        tracing::warn!(run_id = %run.id(), reason = %error, "provisioning failed");
        error
    }

    /// Executes one step and returns the resource it created, if any.
    async fn execute_step(
        &self,
        step: &Step,
        run: &ProvisioningRun,
        resolved: &ResolvedReuseIds,
    ) -> Result<Option<CreatedResource>, StepError> {
        let client = self.client.as_ref();

        let resource = match step {
            Step::CreateVolume(request) => {
                let id = client.create_volume(request.clone()).await?;
                CreatedResource::new(ResourceKind::Volume, id)
            }
            Step::CreateExtent(extent) => {
                let id = client
                    .create_extent(extent_request(extent, run, resolved)?)
                    .await?;
                CreatedResource::new(ResourceKind::Extent, id)
            }
            Step::CreatePortal(request) => {
                let id = client.create_portal(request.clone()).await?;
                CreatedResource::new(ResourceKind::Portal, id)
            }
            Step::CreateInitiatorGroup(request) => {
                let id = client.create_initiator_group(request.clone()).await?;
                CreatedResource::new(ResourceKind::InitiatorGroup, id)
            }
            Step::CreateTarget(target) => {
                let id = client
                    .create_target(target_request(target, run, resolved))
                    .await?;
                CreatedResource::new(ResourceKind::Target, id)
            }
            Step::LinkTargetExtent => {
                let request = TargetExtentLinkRequest {
                    target: reference(run, ResourceKind::Target, resolved.target.as_ref())?,
                    extent: reference(run, ResourceKind::Extent, None)?,
                };
                let id = client.create_target_extent_link(request).await?;
                CreatedResource::new(ResourceKind::TargetExtentLink, id)
            }
            Step::LinkFibreChannelPort(port) => {
                let request = PortLinkRequest {
                    target: reference(run, ResourceKind::Target, resolved.target.as_ref())?,
                    port: port.port.clone(),
                    host_id: port.host_id,
                };
                client.link_port_to_target(request).await?;
                return Ok(None);
            }
        };

        Ok(Some(resource))
    }
}

/// Id created earlier in this run, falling back to the reused id.
fn reference(
    run: &ProvisioningRun,
    kind: ResourceKind,
    reused: Option<&ResourceId>,
) -> Result<ResourceId, StepError> {
    run.created_id(kind)
        .or(reused)
        .cloned()
        .ok_or(StepError::UnresolvedReference(kind))
}

fn extent_request(
    step: &ExtentStep,
    run: &ProvisioningRun,
    resolved: &ResolvedReuseIds,
) -> Result<ExtentRequest, StepError> {
    let source = match &step.backing {
        ExtentBacking::Device => {
            let disk = match run.created_id(ResourceKind::Volume) {
                Some(volume) => format!("{ZVOL_DISK_PREFIX}{volume}"),
                None => resolved
                    .disk
                    .clone()
                    .ok_or(StepError::UnresolvedReference(ResourceKind::Volume))?,
            };
            ExtentSource::Disk { disk }
        }
        ExtentBacking::File { path, size_bytes } => ExtentSource::File {
            path: path.clone(),
            size_bytes: *size_bytes,
        },
    };

    Ok(ExtentRequest {
        name: step.name.clone(),
        source,
        blocksize: step.options.blocksize,
        read_only: step.options.read_only,
        insecure_tpc: step.options.insecure_tpc,
        xen: step.options.xen,
        comment: step.options.comment.clone(),
    })
}

fn target_request(
    step: &TargetStep,
    run: &ProvisioningRun,
    resolved: &ResolvedReuseIds,
) -> TargetRequest {
    let portal = run
        .created_id(ResourceKind::Portal)
        .or(resolved.portal.as_ref())
        .cloned();
    let initiator_group = run
        .created_id(ResourceKind::InitiatorGroup)
        .or(resolved.initiator_group.as_ref())
        .cloned();

    TargetRequest {
        name: step.name.clone(),
        alias: step.alias.clone(),
        mode: step.mode,
        groups: portal
            .map(|portal| TargetGroup {
                portal,
                initiator_group,
            })
            .into_iter()
            .collect(),
    }
}
