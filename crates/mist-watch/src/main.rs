mod config;

use std::sync::Arc;

use mist_api::MistClient;
use mist_dashboard::TracingNotifier;
use mist_dashboard::registry::BackendRegistry;
use mist_dashboard::sync::MachineSync;
use mist_dashboard::types::{Backend, BackendState};
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

use crate::config::WatchConfig;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = WatchConfig::from_env().expect("invalid configuration");

    let mut client = MistClient::new(config.api_url.clone());
    if let Some(token) = &config.api_token {
        client = client.with_token(token.clone());
    }
    tracing::info!(api = %client.base_url(), backends = config.backends.len(), "starting machine watcher");

    let mut registry = BackendRegistry::from_client(client, Arc::new(TracingNotifier));
    for entry in &config.backends {
        let backend = Arc::new(Backend::new(
            entry.index,
            entry.title.clone(),
            entry.provider.clone(),
            entry.poll_interval,
        ));
        let sync = registry.register(Arc::clone(&backend)).await;
        tokio::spawn(watch_backend(backend, sync));
    }

    // SIGHUP resumes polling of offline backends
    let mut hangup = signal(SignalKind::hangup()).expect("failed to listen for SIGHUP");
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.expect("failed to listen for ctrl-c");
                break;
            }
            _ = hangup.recv() => {
                let resumed = registry.retrigger_offline().await;
                tracing::info!(backends = ?resumed, "re-triggered offline backends");
            }
        }
    }

    tracing::info!("shutting down");
    registry.shutdown().await;
}

/// Log state transitions of a backend, with a machine summary whenever a
/// cycle completes.
async fn watch_backend(backend: Arc<Backend>, sync: Arc<MachineSync>) {
    let mut rx = backend.subscribe();
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        match state {
            BackendState::Online => {}
            BackendState::Offline => {
                tracing::warn!(backend = %backend.title(), "backend offline, polling stopped until SIGHUP");
                continue;
            }
            BackendState::Wait | BackendState::Unknown => continue,
        }

        let machines = sync.machines();
        let machines = machines.read().await;
        for record in machines.iter() {
            let machine = record.read().await;
            tracing::debug!(
                backend = %backend.title(),
                machine_id = %machine.id,
                name = %machine.name,
                state = %machine.state,
                has_key = machine.has_key,
                host = machine.ssh_host().unwrap_or("-"),
                "machine"
            );
        }
        tracing::info!(backend = %backend.title(), machines = machines.len(), "machines synced");
    }
}
