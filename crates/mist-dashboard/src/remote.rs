use async_trait::async_trait;
use mist_api::{CreateMachineRequest, MachineItem, MistClient};

use crate::{BoxError, CredentialStore, MachineCreator, MachineSource};

#[async_trait]
impl MachineSource for MistClient {
    async fn list_machines(&self, backend_index: usize) -> Result<Vec<MachineItem>, BoxError> {
        Ok(MistClient::list_machines(self, backend_index).await?)
    }
}

#[async_trait]
impl CredentialStore for MistClient {
    async fn has_key(&self, ip: &str) -> Result<bool, BoxError> {
        Ok(self.machine_has_key(ip).await?)
    }
}

#[async_trait]
impl MachineCreator for MistClient {
    async fn create_machine(
        &self,
        backend_index: usize,
        req: &CreateMachineRequest,
    ) -> Result<MachineItem, BoxError> {
        Ok(MistClient::create_machine(self, backend_index, req).await?)
    }
}
