//! Machine creation form.
//!
//! [`MachineAddForm`] holds the draft for a new machine while the form is
//! open, keeps `form_ready` up to date as fields change, and on submit
//! validates the name against the provider's rules before handing the
//! request to a [`MachineCreator`].

use std::sync::Arc;

use mist_api::{CreateMachineRequest, MachineItem};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::naming::validate_name;
use crate::types::Backend;
use crate::{BoxError, MachineCreator, Notifier, ProviderKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("machine form is not open")]
    NotOpen,

    #[error("machine form is incomplete")]
    Incomplete,

    #[error("{message}")]
    InvalidName {
        provider: ProviderKind,
        message: &'static str,
    },
}

/// Receives the result of a create request issued by [`MachineAddForm::add`].
pub type CreateCallback = Box<dyn FnOnce(Result<MachineItem, BoxError>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPhase {
    Closed,
    Editing,
    /// Held only inside [`MachineAddForm::add`] while the request is built
    /// and spawned; `add` always returns with the form closed.
    Submitting,
}

/// Field values of a machine that has not been created yet.
#[derive(Debug, Clone)]
pub struct MachineDraft {
    pub name: String,
    pub backend: Option<Arc<Backend>>,
    pub size: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub key: Option<String>,
    pub monitoring: bool,
    pub script: String,
    pub cloud_init: String,
    pub project: Option<String>,
    pub associate_floating_ip: bool,
    pub docker_command: String,
    pub docker_env: Vec<String>,
    pub docker_ports: Vec<String>,
    pub azure_ports: Vec<String>,
}

impl Default for MachineDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            backend: None,
            size: None,
            image: None,
            location: None,
            key: None,
            monitoring: true,
            script: String::new(),
            cloud_init: String::new(),
            project: None,
            associate_floating_ip: false,
            docker_command: String::new(),
            docker_env: Vec::new(),
            docker_ports: Vec::new(),
            azure_ports: Vec::new(),
        }
    }
}

fn selected(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn non_blank(field: &str) -> Option<String> {
    let trimmed = field.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl MachineDraft {
    pub fn provider(&self) -> Option<ProviderKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Whether every field required to submit is filled in.
    ///
    /// Docker containers need no SSH key but must be given something to run.
    pub fn is_ready(&self) -> bool {
        let Some(provider) = self.provider() else {
            return false;
        };
        if self.trimmed_name().is_empty() || !selected(&self.size) || !selected(&self.image) {
            return false;
        }
        if provider == ProviderKind::Docker {
            !self.docker_command.trim().is_empty() || !self.script.trim().is_empty()
        } else {
            selected(&self.key)
        }
    }

    /// The name as it is validated and submitted.
    pub fn trimmed_name(&self) -> &str {
        self.name.trim()
    }

    pub fn to_request(&self) -> CreateMachineRequest {
        CreateMachineRequest {
            name: self.trimmed_name().to_string(),
            location: self.location.clone(),
            image: self.image.clone().unwrap_or_default(),
            size: self.size.clone().unwrap_or_default(),
            key: self.key.clone(),
            cloud_init: non_blank(&self.cloud_init),
            script: non_blank(&self.script),
            project: self.project.clone(),
            monitoring: self.monitoring,
            associate_floating_ip: self.associate_floating_ip,
            docker_command: non_blank(&self.docker_command),
            docker_env: self.docker_env.clone(),
            docker_exposed_ports: self.docker_ports.clone(),
            azure_port_bindings: self.azure_ports.clone(),
        }
    }
}

pub struct MachineAddForm {
    creator: Arc<dyn MachineCreator>,
    notifier: Arc<dyn Notifier>,
    phase: FormPhase,
    draft: MachineDraft,
    ready: bool,
    callback: Option<CreateCallback>,
}

impl MachineAddForm {
    pub fn new(creator: Arc<dyn MachineCreator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            creator,
            notifier,
            phase: FormPhase::Closed,
            draft: MachineDraft::default(),
            ready: false,
            callback: None,
        }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn draft(&self) -> &MachineDraft {
        &self.draft
    }

    pub fn form_ready(&self) -> bool {
        self.ready
    }

    /// Show an empty form. `callback` receives the result of the create
    /// request if this form instance is submitted.
    pub fn open(&mut self, callback: Option<CreateCallback>) {
        self.reset();
        self.callback = callback;
        self.phase = FormPhase::Editing;
    }

    pub fn close(&mut self) {
        self.reset();
        self.callback = None;
        self.phase = FormPhase::Closed;
    }

    /// Mutate the draft and recompute `form_ready`.
    pub fn update(&mut self, edit: impl FnOnce(&mut MachineDraft)) {
        edit(&mut self.draft);
        self.ready = self.draft.is_ready();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.update(|d| d.name = name);
    }

    pub fn select_backend(&mut self, backend: Arc<Backend>) {
        self.update(|d| d.backend = Some(backend));
    }

    pub fn select_size(&mut self, size: impl Into<String>) {
        let size = size.into();
        self.update(|d| d.size = Some(size));
    }

    pub fn select_image(&mut self, image: impl Into<String>) {
        let image = image.into();
        self.update(|d| d.image = Some(image));
    }

    pub fn select_location(&mut self, location: impl Into<String>) {
        let location = location.into();
        self.update(|d| d.location = Some(location));
    }

    pub fn select_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.update(|d| d.key = Some(key));
    }

    /// Validate and submit the draft.
    ///
    /// The form is reset and closed as soon as the request is issued; the
    /// outcome only reaches the callback registered in [`open`](Self::open).
    /// The returned handle resolves once that callback has run.
    pub fn add(&mut self) -> Result<JoinHandle<()>, ValidationError> {
        if self.phase != FormPhase::Editing {
            return Err(ValidationError::NotOpen);
        }
        let Some(backend) = self.draft.backend.clone().filter(|_| self.ready) else {
            return Err(ValidationError::Incomplete);
        };

        if let Err(e) = validate_name(backend.kind(), self.draft.trimmed_name()) {
            self.notifier.notify(&e.to_string());
            return Err(e);
        }

        self.phase = FormPhase::Submitting;
        let req = self.draft.to_request();
        let callback = self.callback.take();
        let creator = Arc::clone(&self.creator);
        let backend_index = backend.index();

        let task = tokio::spawn(async move {
            let result = creator.create_machine(backend_index, &req).await;
            match &result {
                Ok(machine) => {
                    info!(backend_index, machine_id = %machine.id, name = %req.name, "machine created")
                }
                Err(e) => warn!(backend_index, name = %req.name, error = %e, "machine creation failed"),
            }
            if let Some(callback) = callback {
                callback(result);
            }
        });

        self.close();
        Ok(task)
    }

    fn reset(&mut self) {
        self.draft = MachineDraft::default();
        self.ready = false;
    }
}
