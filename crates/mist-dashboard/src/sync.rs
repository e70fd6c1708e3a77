//! Machine list synchronization.
//!
//! [`MachineSync`] keeps one backend's machine list in step with the server:
//! each cycle fetches the authoritative list and merges it into the local
//! collection by identifier. [`MachineSync::spawn`] runs cycles back to back
//! until one fails or the returned [`SyncHandle`] is stopped.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use mist_api::MachineItem;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{Backend, BackendState, Machine, SharedMachine};
use crate::{CredentialStore, Error, MachineSource, Notifier, Result};

/// Machines of one backend, in the order they were first seen.
///
/// Records are only ever appended; a machine that disappears from the server
/// response stays in the list.
#[derive(Debug, Default)]
pub struct MachineList {
    records: Vec<SharedMachine>,
    index: HashMap<String, usize>,
}

impl MachineList {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SharedMachine> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedMachine> {
        self.records.iter()
    }

    fn push(&mut self, id: String, record: SharedMachine) {
        self.index.insert(id, self.records.len());
        self.records.push(record);
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

/// Outcome of a successful sync cycle.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub updated: usize,
    pub added: usize,
    /// Credential probes started for the added machines.
    pub probes: Vec<JoinHandle<()>>,
}

impl SyncReport {
    /// Wait until every credential probe of this cycle has stored its result.
    pub async fn wait_for_probes(self) {
        join_all(self.probes).await;
    }
}

pub struct MachineSync {
    backend: Arc<Backend>,
    source: Arc<dyn MachineSource>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    machines: Arc<RwLock<MachineList>>,
    /// Held for the whole of a cycle so fetches for this backend never overlap.
    cycle: Mutex<()>,
}

impl MachineSync {
    pub fn new(
        backend: Arc<Backend>,
        source: Arc<dyn MachineSource>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            source,
            credentials,
            notifier,
            machines: Arc::new(RwLock::new(MachineList::default())),
            cycle: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn machines(&self) -> Arc<RwLock<MachineList>> {
        Arc::clone(&self.machines)
    }

    /// Run one fetch-and-merge cycle.
    ///
    /// An offline backend gets its list cleared and the cycle halts with
    /// [`Error::Offline`]. A failed fetch notifies the user, marks the
    /// backend offline and leaves the list untouched. Concurrent calls run
    /// one after another.
    pub async fn refresh(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let backend = &self.backend;

        if backend.state() == BackendState::Offline {
            let mut machines = self.machines.write().await;
            if !machines.is_empty() {
                info!(backend = %backend.title(), dropped = machines.len(), "backend offline, clearing machines");
                machines.clear();
            }
            return Err(Error::Offline(backend.title().to_string()));
        }

        backend.set_state(BackendState::Wait);

        let items = match self.source.list_machines(backend.index()).await {
            Ok(items) => items,
            Err(e) => {
                warn!(backend = %backend.title(), error = %e, "failed to fetch machines");
                self.notifier.notify(&format!(
                    "Failed to load machines for {}: {e}",
                    backend.title()
                ));
                backend.set_state(BackendState::Offline);
                return Err(Error::Fetch(e));
            }
        };

        let report = self.reconcile(items).await;
        backend.set_state(BackendState::Online);

        debug!(
            backend = %backend.title(),
            updated = report.updated,
            added = report.added,
            "machines synced"
        );
        Ok(report)
    }

    async fn reconcile(&self, items: Vec<MachineItem>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut machines = self.machines.write().await;

        for item in items {
            if let Some(existing) = machines.get(&item.id) {
                existing.write().await.apply(item);
                report.updated += 1;
                continue;
            }

            let id = item.id.clone();
            let machine = Machine::from_item(item, Arc::clone(&self.backend));
            let probe_ip = machine.primary_public_ip().map(str::to_string);
            let record = Arc::new(RwLock::new(machine));

            machines.push(id, Arc::clone(&record));
            report.added += 1;

            if let Some(ip) = probe_ip {
                report.probes.push(self.spawn_key_probe(record, ip));
            }
        }

        report
    }

    /// Look up credentials for a new machine in the background. A failed
    /// probe counts as "no key".
    fn spawn_key_probe(&self, record: SharedMachine, ip: String) -> JoinHandle<()> {
        let credentials = Arc::clone(&self.credentials);
        tokio::spawn(async move {
            let has_key = match credentials.has_key(&ip).await {
                Ok(has_key) => has_key,
                Err(e) => {
                    debug!(ip = %ip, error = %e, "key probe failed");
                    false
                }
            };
            record.write().await.has_key = has_key;
        })
    }

    /// Poll in the background until a cycle fails or the handle is stopped.
    ///
    /// The next fetch is scheduled `poll_interval` after the previous cycle
    /// completed, so fetches for one backend never overlap.
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move { self.run(task_token).await });
        SyncHandle { token, task }
    }

    async fn run(&self, token: CancellationToken) {
        let title = self.backend.title();
        let interval = self.backend.poll_interval();
        info!(backend = %title, interval = ?interval, "machine sync started");

        loop {
            if token.is_cancelled() {
                break;
            }

            if let Err(e) = self.refresh().await {
                info!(backend = %title, error = %e, "machine sync halted");
                return;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(backend = %title, "machine sync stopped");
    }
}

/// Handle to a running [`MachineSync`] task.
///
/// Dropping the handle leaves the task running.
pub struct SyncHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop scheduling fetches. A fetch already in flight still completes
    /// and applies its result.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit, without stopping it.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "machine sync task panicked");
        }
    }

    pub async fn stop_and_wait(self) {
        self.stop();
        self.join().await;
    }
}
