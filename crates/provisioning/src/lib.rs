//! Multi-resource target provisioning with compensating rollback.
//!
//! Creating a network storage target touches up to six interdependent
//! resources on the control plane:
//! 1. Volume (optional)
//! 2. Extent
//! 3. Portal (iSCSI, optional)
//! 4. Initiator group (iSCSI, optional)
//! 5. Target (optional when reusing one)
//! 6. Target-extent link
//! 7. Fibre Channel port binding (Fibre Channel only)
//!
//! If any step fails, every resource the run created is deleted in reverse
//! order before the error is returned.

pub mod cancel;
pub mod client;
pub mod error;
pub mod events;
pub mod intent;
pub mod orchestrator;
pub mod plan;
pub mod resource;
pub mod result;
pub mod rollback;
pub mod run;
pub mod state;

pub use cancel::{CancelHandle, CancelSignal};
pub use client::{
    ClientCall, HttpClientConfig, HttpResourceClient, InMemoryResourceClient, Operation,
    ResourceClient,
};
pub use error::{ClientError, PlanError, ProvisionError, StepError};
pub use events::RunEvent;
pub use intent::{
    DeviceSource, ExtentKind, ExtentOptions, ExtentSpec, FibreChannelPortSpec,
    InitiatorGroupSpec, PortalSpec, ProvisioningIntent, TargetMode, TargetSpec,
};
pub use orchestrator::{ProvisioningOrchestrator, RunOutcome};
pub use plan::{ResolvedReuseIds, Step, StepKind, StepPlan, build_plan};
pub use resource::{CreatedResource, ResourceKind};
pub use result::ProvisioningResult;
pub use rollback::{RollbackFailure, RollbackReport, rollback};
pub use run::ProvisioningRun;
pub use state::RunState;
