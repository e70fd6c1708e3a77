use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use mist_api::MistClient;

use crate::sync::{MachineSync, SyncHandle};
use crate::types::{Backend, BackendState};
use crate::{CredentialStore, Error, MachineSource, Notifier, Result};

struct Entry {
    sync: Arc<MachineSync>,
    handle: Option<SyncHandle>,
}

/// All configured backends and the synchronizers polling them.
pub struct BackendRegistry {
    source: Arc<dyn MachineSource>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    entries: BTreeMap<usize, Entry>,
}

impl BackendRegistry {
    pub fn new(
        source: Arc<dyn MachineSource>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            credentials,
            notifier,
            entries: BTreeMap::new(),
        }
    }

    /// Registry backed by a single API client for both listing and key probes.
    pub fn from_client(client: MistClient, notifier: Arc<dyn Notifier>) -> Self {
        let client = Arc::new(client);
        Self::new(client.clone(), client, notifier)
    }

    /// Add a backend and start polling it. Re-registering an index stops the
    /// previous synchronizer and waits for its last fetch first.
    pub async fn register(&mut self, backend: Arc<Backend>) -> Arc<MachineSync> {
        let index = backend.index();
        if let Some(previous) = self.entries.remove(&index)
            && let Some(handle) = previous.handle
        {
            tracing::debug!(backend_index = index, "replacing registered backend");
            handle.stop_and_wait().await;
        }

        let sync = Arc::new(MachineSync::new(
            backend,
            Arc::clone(&self.source),
            Arc::clone(&self.credentials),
            Arc::clone(&self.notifier),
        ));
        let handle = Arc::clone(&sync).spawn();
        tracing::info!(backend_index = index, backend = %sync.backend().title(), "registered backend");

        self.entries.insert(
            index,
            Entry {
                sync: Arc::clone(&sync),
                handle: Some(handle),
            },
        );
        sync
    }

    pub fn get(&self, index: usize) -> Option<&Arc<MachineSync>> {
        self.entries.get(&index).map(|e| &e.sync)
    }

    /// Registered backends, ordered by index.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.entries
            .values()
            .map(|e| Arc::clone(e.sync.backend()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resume polling a backend after a failure took it offline.
    ///
    /// A fetch still in flight on the previous task finishes before the new
    /// task starts.
    pub async fn retrigger(&mut self, index: usize) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(Error::UnknownBackend(index))?;

        if let Some(handle) = entry.handle.take() {
            handle.stop_and_wait().await;
        }
        entry.sync.backend().reset();
        entry.handle = Some(Arc::clone(&entry.sync).spawn());

        tracing::info!(backend_index = index, "backend polling re-triggered");
        Ok(())
    }

    /// Re-trigger every backend currently offline. Returns their indexes.
    pub async fn retrigger_offline(&mut self) -> Vec<usize> {
        let offline: Vec<usize> = self
            .entries
            .iter()
            .filter(|(_, e)| e.sync.backend().state() == BackendState::Offline)
            .map(|(&index, _)| index)
            .collect();

        for &index in &offline {
            if let Err(e) = self.retrigger(index).await {
                tracing::warn!(backend_index = index, error = %e, "failed to re-trigger backend");
            }
        }
        offline
    }

    /// Stop polling one backend, keeping its machine list.
    pub fn stop(&mut self, index: usize) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(Error::UnknownBackend(index))?;
        if let Some(handle) = entry.handle.take() {
            handle.stop();
        }
        Ok(())
    }

    /// Stop every synchronizer and wait for them to exit.
    pub async fn shutdown(self) {
        let handles = self
            .entries
            .into_values()
            .filter_map(|e| e.handle)
            .map(SyncHandle::stop_and_wait);
        join_all(handles).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::test_support::{FakeCredentials, FakeSource, RecordingNotifier, SlowSource};

    async fn wait_for_state(backend: &Backend, state: BackendState) {
        let mut rx = backend.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for backend state")
            .expect("backend dropped");
    }

    fn registry(source: Arc<FakeSource>) -> BackendRegistry {
        BackendRegistry::new(
            source,
            Arc::new(FakeCredentials::default()),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[tokio::test]
    async fn test_register_starts_polling() {
        let source = Arc::new(FakeSource::new(json!([{"id": "1"}, {"id": "2"}])));
        let mut registry = registry(source.clone());

        let backend = Arc::new(Backend::new(1, "Linode", "linode", Duration::from_secs(60)));
        let sync = registry.register(backend.clone()).await;
        wait_for_state(&backend, BackendState::Online).await;

        assert_eq!(sync.machines().read().await.len(), 2);
        assert_eq!(registry.backends().len(), 1);
        assert!(registry.get(1).is_some());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_retrigger_after_failure() {
        let source = Arc::new(FakeSource::new(json!([])));
        source.fail("timeout");
        let mut registry = registry(source.clone());

        let backend = Arc::new(Backend::new(0, "EC2", "ec2_us_east", Duration::from_secs(60)));
        registry.register(backend.clone()).await;
        wait_for_state(&backend, BackendState::Offline).await;

        source.set_machines(json!([{"id": "i-1"}]));
        registry.retrigger(0).await.unwrap();
        wait_for_state(&backend, BackendState::Online).await;
        assert_eq!(source.calls(), 2);

        assert!(matches!(
            registry.retrigger(7).await,
            Err(Error::UnknownBackend(7))
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_retrigger_waits_for_fetch_in_flight() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(200)));
        let mut registry = BackendRegistry::new(
            source.clone(),
            Arc::new(FakeCredentials::default()),
            Arc::new(RecordingNotifier::default()),
        );

        let backend = Arc::new(Backend::new(0, "EC2", "ec2_us_east", Duration::from_secs(60)));
        registry.register(backend.clone()).await;
        wait_for_state(&backend, BackendState::Wait).await;
        assert_eq!(source.in_flight(), 1);

        registry.retrigger(0).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while source.calls() < 2 || source.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("re-triggered sync should fetch again");

        assert_eq!(source.max_in_flight(), 1, "fetches for one backend overlapped");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_retrigger_offline_resumes_only_offline_backends() {
        let source = Arc::new(FakeSource::new(json!([])));
        source.fail("timeout");
        let mut registry = registry(source.clone());

        let ec2 = Arc::new(Backend::new(0, "EC2", "ec2_us_east", Duration::from_secs(60)));
        registry.register(ec2.clone()).await;
        wait_for_state(&ec2, BackendState::Offline).await;

        source.set_machines(json!([{"id": "i-1"}]));
        let linode = Arc::new(Backend::new(1, "Linode", "linode", Duration::from_secs(60)));
        registry.register(linode.clone()).await;
        wait_for_state(&linode, BackendState::Online).await;

        assert_eq!(registry.retrigger_offline().await, vec![0]);
        wait_for_state(&ec2, BackendState::Online).await;
        assert_eq!(source.calls(), 3);

        registry.shutdown().await;
    }
}
