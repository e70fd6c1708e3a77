//! Typed Rust client for the mist dashboard HTTP API.
//!
//! Covers the subset the dashboard model needs: listing and creating
//! machines per backend, and probing for usable SSH credentials.

mod types;

pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mist api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mist api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the mist REST API.
#[derive(Clone)]
pub struct MistClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl MistClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Machines ─────────────────────────────────────────────────────

    pub async fn list_machines(&self, backend_index: usize) -> Result<Vec<MachineItem>> {
        let resp = self
            .authorize(
                self.http
                    .get(self.url(&format!("/backends/{backend_index}/machines"))),
            )
            .send()
            .await?;

        let machines: Vec<MachineItem> = Self::check(resp, "list machines").await?.json().await?;
        tracing::debug!(backend_index, count = machines.len(), "mist: machines listed");
        Ok(machines)
    }

    pub async fn create_machine(
        &self,
        backend_index: usize,
        req: &CreateMachineRequest,
    ) -> Result<MachineItem> {
        let resp = self
            .authorize(
                self.http
                    .post(self.url(&format!("/backends/{backend_index}/machines"))),
            )
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Keys ─────────────────────────────────────────────────────────

    /// Ask the server whether it holds a usable SSH key for `ip`.
    pub async fn machine_has_key(&self, ip: &str) -> Result<bool> {
        let resp = self
            .authorize(self.http.get(self.url("/machine_has_key")))
            .query(&[("ip", ip)])
            .send()
            .await?;

        let value: serde_json::Value = Self::check(resp, "machine has key").await?.json().await?;
        Ok(truthy(&value))
    }
}
