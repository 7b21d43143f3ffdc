//! Provisioning intent: what the operator asked for.
//!
//! An intent arrives already validated by the caller. It only says, per
//! resource, whether a new one should be created or an existing one reused,
//! plus the parameters for anything new.

use std::net::IpAddr;

use common::ResourceId;
use serde::{Deserialize, Serialize};

/// Transport the target is exposed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    #[default]
    Iscsi,
    FibreChannel,
}

impl TargetMode {
    /// Returns the mode name used by the control plane.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Iscsi => "ISCSI",
            TargetMode::FibreChannel => "FC",
        }
    }
}

impl std::fmt::Display for TargetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target choice: reuse an existing target or create a new one.
///
/// A new target is named after the extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSpec {
    Reuse(ResourceId),
    CreateNew {
        #[serde(default)]
        alias: Option<String>,
    },
}

/// Where a device extent gets its block device from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSource {
    /// An existing disk reference, passed to the control plane verbatim.
    Existing { disk: String },
    /// A new volume named after the extent, created under `dataset_path`.
    NewVolume {
        dataset_path: String,
        volume_size_bytes: u64,
    },
}

/// Backing storage of an extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentKind {
    Device(DeviceSource),
    File { path: String, file_size_bytes: u64 },
}

/// Tunables passed through to the extent create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentOptions {
    pub blocksize: u32,
    pub read_only: bool,
    /// Allow initiators to use third-party copy without authorization.
    pub insecure_tpc: bool,
    /// Xen initiator compatibility mode.
    pub xen: bool,
    pub comment: Option<String>,
}

impl Default for ExtentOptions {
    fn default() -> Self {
        Self {
            blocksize: 512,
            read_only: false,
            insecure_tpc: true,
            xen: false,
            comment: None,
        }
    }
}

/// The extent is always created; only its backing storage may be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentSpec {
    pub name: String,
    pub kind: ExtentKind,
    #[serde(default)]
    pub options: ExtentOptions,
}

/// Portal choice (iSCSI only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalSpec {
    Reuse(ResourceId),
    CreateNew {
        listen: Vec<IpAddr>,
        #[serde(default)]
        comment: Option<String>,
    },
}

/// Initiator group choice (iSCSI only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitiatorGroupSpec {
    Reuse(ResourceId),
    /// No initiator group: every initiator may connect.
    #[default]
    Unrestricted,
    CreateNew {
        allowed_initiators: Vec<String>,
        #[serde(default)]
        comment: Option<String>,
    },
}

/// Fibre Channel port to associate with the target (Fibre Channel only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibreChannelPortSpec {
    pub port: String,
    pub host_id: u32,
}

/// Immutable description of a compound target to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningIntent {
    #[serde(default)]
    pub target_mode: TargetMode,
    pub target: TargetSpec,
    pub extent: ExtentSpec,
    #[serde(default)]
    pub portal: Option<PortalSpec>,
    #[serde(default)]
    pub initiator_group: InitiatorGroupSpec,
    #[serde(default)]
    pub fibre_channel_port: Option<FibreChannelPortSpec>,
}

impl ProvisioningIntent {
    /// Starts an iSCSI intent that creates a new target for `extent`.
    pub fn iscsi(extent: ExtentSpec) -> Self {
        Self {
            target_mode: TargetMode::Iscsi,
            target: TargetSpec::CreateNew { alias: None },
            extent,
            portal: None,
            initiator_group: InitiatorGroupSpec::Unrestricted,
            fibre_channel_port: None,
        }
    }

    /// Starts a Fibre Channel intent that creates a new target for `extent`.
    pub fn fibre_channel(extent: ExtentSpec, port: FibreChannelPortSpec) -> Self {
        Self {
            target_mode: TargetMode::FibreChannel,
            target: TargetSpec::CreateNew { alias: None },
            extent,
            portal: None,
            initiator_group: InitiatorGroupSpec::Unrestricted,
            fibre_channel_port: Some(port),
        }
    }

    pub fn with_target(mut self, target: TargetSpec) -> Self {
        self.target = target;
        self
    }

    pub fn with_portal(mut self, portal: PortalSpec) -> Self {
        self.portal = Some(portal);
        self
    }

    pub fn with_initiator_group(mut self, group: InitiatorGroupSpec) -> Self {
        self.initiator_group = group;
        self
    }

    pub fn with_fibre_channel_port(mut self, port: FibreChannelPortSpec) -> Self {
        self.fibre_channel_port = Some(port);
        self
    }
}

impl ExtentSpec {
    /// Device extent backed by a new volume named after the extent.
    pub fn new_volume(
        name: impl Into<String>,
        dataset_path: impl Into<String>,
        volume_size_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ExtentKind::Device(DeviceSource::NewVolume {
                dataset_path: dataset_path.into(),
                volume_size_bytes,
            }),
            options: ExtentOptions::default(),
        }
    }

    /// Device extent over an existing disk.
    pub fn existing_disk(name: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExtentKind::Device(DeviceSource::Existing { disk: disk.into() }),
            options: ExtentOptions::default(),
        }
    }

    /// File-backed extent.
    pub fn file(name: impl Into<String>, path: impl Into<String>, file_size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            kind: ExtentKind::File {
                path: path.into(),
                file_size_bytes,
            },
            options: ExtentOptions::default(),
        }
    }
}
