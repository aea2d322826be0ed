use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known health of a child instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Never diagnosed since provisioning.
    #[default]
    Unknown,
    /// Still being created by the provisioner.
    Provisioning,
    Healthy,
    Degraded,
    /// Reachable, but the gateway service is down.
    Offline,
    /// The remote channel could not be established.
    Unreachable,
}

impl InstanceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Provisioning => "provisioning",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
            Self::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the identity/checkpoint subsystem on a child.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum AmcpStatus {
    #[default]
    Absent,
    Bootstrapped,
    /// Was bootstrapped, but a later diagnosis found AMCP errors.
    Degraded,
}

impl std::fmt::Display for AmcpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Bootstrapped => "bootstrapped",
            Self::Degraded => "degraded",
        })
    }
}

/// Where escalations for a child are delivered.
///
/// Configured by the parent at pairing time; this crate only carries it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl NotifyTarget {
    /// Returns `true` when no delivery channel is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bot_token.is_none() && self.chat_id.is_none() && self.email.is_none()
    }
}

/// Durable record for one child, stored as `instances/<name>.json`.
///
/// Created by the provisioner. `name` never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub ip: String,
    pub ssh_user: String,
    /// Path to the private key used for this child.
    pub ssh_key_ref: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_token: Option<String>,
    #[serde(default)]
    pub amcp_status: AmcpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_diagnosed_at: Option<DateTime<Utc>>,
    /// Failed remediation runs carried across invocations. Only maintained
    /// when cross-run accumulation is enabled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub remediation_failures: u32,
    #[serde(default, skip_serializing_if = "NotifyTarget::is_empty")]
    pub parent_notify: NotifyTarget,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde skip_serializing_if takes &T
fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Instance {
    /// Build a fresh record with every optional field empty.
    #[must_use]
    pub fn new(name: &str, ip: &str, ssh_user: &str, ssh_key_ref: &str) -> Self {
        Self {
            name: name.to_string(),
            ip: ip.to_string(),
            ssh_user: ssh_user.to_string(),
            ssh_key_ref: ssh_key_ref.to_string(),
            region: String::new(),
            status: InstanceStatus::Unknown,
            gateway_token: None,
            amcp_status: AmcpStatus::Absent,
            last_checkpoint_cid: None,
            last_checkpoint_at: None,
            last_diagnosed_at: None,
            remediation_failures: 0,
            parent_notify: NotifyTarget::default(),
        }
    }
}
