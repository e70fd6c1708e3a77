pub mod actions;
pub mod form;
pub mod naming;
pub mod registry;
pub mod remote;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_support;

use std::fmt;

use async_trait::async_trait;
use mist_api::{CreateMachineRequest, MachineItem};
use serde::{Deserialize, Serialize};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("machine list fetch failed: {0}")]
    Fetch(BoxError),

    #[error("backend {0} is offline")]
    Offline(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Cloud provider families the dashboard knows about.
///
/// Backends carry a free-form provider string (a slug such as `ec2_us_east`
/// or a display title such as `HP Cloud`); anything unrecognised is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ec2,
    Rackspace,
    Openstack,
    Linode,
    NephoScale,
    SoftLayer,
    HpCloud,
    Azure,
    Gce,
    DigitalOcean,
    Docker,
    Other,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2 => "ec2",
            Self::Rackspace => "rackspace",
            Self::Openstack => "openstack",
            Self::Linode => "linode",
            Self::NephoScale => "nephoscale",
            Self::SoftLayer => "softlayer",
            Self::HpCloud => "hpcloud",
            Self::Azure => "azure",
            Self::Gce => "gce",
            Self::DigitalOcean => "digitalocean",
            Self::Docker => "docker",
            Self::Other => "other",
        }
    }

    /// Match a provider slug or display title, ignoring case and separators.
    pub fn parse(provider: &str) -> Self {
        let normalized: String = provider
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        if normalized.starts_with("ec2") {
            return Self::Ec2;
        }
        if normalized.starts_with("rackspace") {
            return Self::Rackspace;
        }
        match normalized.as_str() {
            "openstack" => Self::Openstack,
            "linode" => Self::Linode,
            "nephoscale" => Self::NephoScale,
            "softlayer" => Self::SoftLayer,
            "hpcloud" => Self::HpCloud,
            "azure" => Self::Azure,
            "gce" | "googlecomputeengine" => Self::Gce,
            "digitalocean" => Self::DigitalOcean,
            "docker" => Self::Docker,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Collaborators ────────────────────────────────────────────────────

/// Source of the authoritative machine list for a backend.
#[async_trait]
pub trait MachineSource: Send + Sync + 'static {
    async fn list_machines(
        &self,
        backend_index: usize,
    ) -> std::result::Result<Vec<MachineItem>, BoxError>;
}

/// Answers whether a usable SSH credential exists for an address.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn has_key(&self, ip: &str) -> std::result::Result<bool, BoxError>;
}

/// Issues machine creation requests.
#[async_trait]
pub trait MachineCreator: Send + Sync + 'static {
    async fn create_machine(
        &self,
        backend_index: usize,
        req: &CreateMachineRequest,
    ) -> std::result::Result<MachineItem, BoxError>;
}

/// Surface for user-visible, transient messages.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, message: &str);
}

/// Notifier for headless hosts: every notification becomes a `warn` event.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::warn!(notification = message, "notify");
    }
}
