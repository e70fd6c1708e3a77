use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mist_api::{CreateMachineRequest, MachineItem};
use serde_json::Value;

use crate::{BoxError, CredentialStore, MachineCreator, MachineSource, Notifier};

pub fn items(value: Value) -> Vec<MachineItem> {
    serde_json::from_value(value).unwrap()
}

/// Machine source replaying whatever was last configured.
pub struct FakeSource {
    next: Mutex<Result<Vec<MachineItem>, String>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(machines: Value) -> Self {
        Self {
            next: Mutex::new(Ok(items(machines))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_machines(&self, machines: Value) {
        *self.next.lock().unwrap() = Ok(items(machines));
    }

    pub fn fail(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MachineSource for FakeSource {
    async fn list_machines(&self, _backend_index: usize) -> Result<Vec<MachineItem>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next.lock().unwrap().clone().map_err(Into::into)
    }
}

/// Machine source that holds every call for `delay` and tracks how many
/// calls were in flight at once.
pub struct SlowSource {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MachineSource for SlowSource {
    async fn list_machines(&self, _backend_index: usize) -> Result<Vec<MachineItem>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct FakeCredentials {
    keyed: HashSet<String>,
    broken: HashSet<String>,
}

impl FakeCredentials {
    pub fn with_key(mut self, ip: &str) -> Self {
        self.keyed.insert(ip.to_string());
        self
    }

    pub fn broken_for(mut self, ip: &str) -> Self {
        self.broken.insert(ip.to_string());
        self
    }
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn has_key(&self, ip: &str) -> Result<bool, BoxError> {
        if self.broken.contains(ip) {
            return Err("key probe timed out".into());
        }
        Ok(self.keyed.contains(ip))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct FakeCreator {
    requests: Mutex<Vec<(usize, CreateMachineRequest)>>,
    failing: bool,
}

impl FakeCreator {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<(usize, CreateMachineRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MachineCreator for FakeCreator {
    async fn create_machine(
        &self,
        backend_index: usize,
        req: &CreateMachineRequest,
    ) -> Result<MachineItem, BoxError> {
        self.requests
            .lock()
            .unwrap()
            .push((backend_index, req.clone()));
        if self.failing {
            return Err("quota exceeded".into());
        }
        Ok(serde_json::from_value(serde_json::json!({
            "id": format!("m-{}", req.name),
            "name": req.name,
        }))?)
    }
}
