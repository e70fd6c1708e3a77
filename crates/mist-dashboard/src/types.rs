use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use mist_api::{MachineItem, MachineState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, watch};

use crate::ProviderKind;
use crate::actions::MachineActions;

/// Connectivity of a backend as seen by the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    #[default]
    Unknown,
    Wait,
    Online,
    Offline,
}

impl BackendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Wait => "wait",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured cloud provider account.
///
/// Shared between the synchronizer, the creation form and any UI host;
/// state changes can be observed through [`Backend::subscribe`].
#[derive(Debug)]
pub struct Backend {
    index: usize,
    title: String,
    provider: String,
    poll_interval: Duration,
    state: watch::Sender<BackendState>,
}

impl Backend {
    pub fn new(
        index: usize,
        title: impl Into<String>,
        provider: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(BackendState::Unknown);
        Self {
            index,
            title: title.into(),
            provider: provider.into(),
            poll_interval,
            state,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn kind(&self) -> ProviderKind {
        ProviderKind::parse(&self.provider)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: BackendState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(backend = %self.title, from = %previous, to = %state, "backend state changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.state.subscribe()
    }

    /// Clear an `offline` mark so the backend can be polled again.
    /// Returns `false` if the backend was not offline.
    pub fn reset(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == BackendState::Offline {
                *state = BackendState::Unknown;
                true
            } else {
                false
            }
        })
    }
}

/// Machine record shared with UI bindings. Reconciliation mutates it in
/// place, so a handle stays valid across polls.
pub type SharedMachine = Arc<RwLock<Machine>>;

#[derive(Debug, Clone)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub public_ips: Vec<String>,
    pub private_ips: Vec<String>,
    pub image: Option<String>,
    pub provider: Option<String>,
    pub extra: Map<String, Value>,
    pub state: MachineState,
    pub has_key: bool,
    pub backend: Arc<Backend>,
}

impl Machine {
    pub fn from_item(item: MachineItem, backend: Arc<Backend>) -> Self {
        let provider = item.provider().map(str::to_string);
        Self {
            id: item.id,
            name: item.name,
            public_ips: item.public_ips,
            private_ips: item.private_ips,
            image: item.image,
            provider,
            extra: item.extra,
            state: item.state,
            has_key: false,
            backend,
        }
    }

    /// Overwrite every server-provided field. `has_key` and the backend
    /// reference are local and left alone.
    pub fn apply(&mut self, item: MachineItem) {
        self.provider = item.provider().map(str::to_string);
        self.name = item.name;
        self.public_ips = item.public_ips;
        self.private_ips = item.private_ips;
        self.image = item.image;
        self.extra = item.extra;
        self.state = item.state;
    }

    pub fn primary_public_ip(&self) -> Option<&str> {
        self.public_ips.first().map(String::as_str)
    }

    pub fn dns_name(&self) -> Option<&str> {
        self.extra
            .get("dns_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Host to open SSH sessions against: the DNS name when the provider
    /// reports one, otherwise the first public address.
    pub fn ssh_host(&self) -> Option<&str> {
        self.dns_name().or_else(|| self.primary_public_ip())
    }

    pub fn launched_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.extra.get("launchdatetime")?.as_str()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ts| ts.and_utc())
    }

    pub fn actions(&self) -> MachineActions {
        MachineActions::for_state(self.state, self.backend.kind())
    }
}
