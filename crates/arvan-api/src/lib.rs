//! Typed Rust client for the ArvanCloud ECC compute API.
//!
//! Covers the subset needed for managing docker hosts:
//! servers (create, get, power actions, delete) and SSH keys (upload, delete).

mod types;

pub use types::*;

pub use reqwest::StatusCode;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;

pub const BASE_URL: &str = "https://napi.arvancloud.com/ecc/v1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("arvan api request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// `body` holds the response bytes exactly as received.
    #[error(
        "arvan api {endpoint} returned {status} (expected {expected}): {}",
        String::from_utf8_lossy(.body)
    )]
    UnexpectedStatus {
        endpoint: &'static str,
        expected: StatusCode,
        status: StatusCode,
        body: Vec<u8>,
    },

    #[error("arvan api {endpoint} returned malformed json: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the region-scoped ArvanCloud compute REST API.
#[derive(Clone)]
pub struct ArvanClient {
    token: String,
    region: String,
    base_url: String,
    http: reqwest::Client,
}

impl ArvanClient {
    pub fn new(token: impl Into<String>, region: impl Into<String>) -> Self {
        Self::with_base_url(BASE_URL, token, region)
    }

    /// Point the client at a different API root (everything before `/regions`).
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            region: region.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn url(&self, path: &str) -> String {
        format!("{}/regions/{}{path}", self.base_url, self.region)
    }

    fn auth(&self) -> String {
        format!("Apikey {}", self.token)
    }

    /// Start a request with the auth and content-type headers already set.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(AUTHORIZATION, self.auth())
            .header(CONTENT_TYPE, "application/json")
    }

    /// Send the request and return the full body if the status matches `expected`.
    async fn send(
        req: reqwest::RequestBuilder,
        endpoint: &'static str,
        expected: StatusCode,
    ) -> Result<Vec<u8>> {
        let resp = req.send().await?;

        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        tracing::debug!(endpoint, %status, "arvan api response");

        if status != expected {
            return Err(Error::UnexpectedStatus {
                endpoint,
                expected,
                status,
                body,
            });
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &[u8], endpoint: &'static str) -> Result<T> {
        serde_json::from_slice(body).map_err(|source| Error::Decode { endpoint, source })
    }

    // ── Servers ──────────────────────────────────────────────────────

    pub async fn get_server(&self, server_id: &str) -> Result<Server> {
        let body = Self::send(
            self.request(Method::GET, &format!("/servers/{server_id}")),
            "get server",
            StatusCode::OK,
        )
        .await?;

        Self::decode::<serde_json::Value>(&body, "get server").map(|v| Server::from_body(&v))
    }

    /// Create a server and return its id.
    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<String> {
        let body = Self::send(
            self.request(Method::POST, "/servers").json(req),
            "create server",
            StatusCode::CREATED,
        )
        .await?;

        Self::decode::<CreateServerResponse>(&body, "create server").map(|resp| resp.data.id)
    }

    pub async fn start_server(&self, server_id: &str) -> Result<()> {
        Self::send(
            self.request(Method::POST, &format!("/servers/{server_id}/power-on")),
            "start server",
            StatusCode::ACCEPTED,
        )
        .await?;
        Ok(())
    }

    pub async fn stop_server(&self, server_id: &str) -> Result<()> {
        Self::send(
            self.request(Method::POST, &format!("/servers/{server_id}/power-off")),
            "stop server",
            StatusCode::ACCEPTED,
        )
        .await?;
        Ok(())
    }

    pub async fn restart_server(&self, server_id: &str) -> Result<()> {
        Self::send(
            self.request(Method::POST, &format!("/servers/{server_id}/reboot")),
            "restart server",
            StatusCode::ACCEPTED,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_server(&self, server_id: &str) -> Result<()> {
        Self::send(
            self.request(Method::DELETE, &format!("/servers/{server_id}")),
            "remove server",
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }

    // ── SSH keys ─────────────────────────────────────────────────────

    pub async fn upload_ssh_key(&self, key: &SshKey) -> Result<()> {
        Self::send(
            self.request(Method::POST, "/ssh-keys").json(key),
            "upload ssh key",
            StatusCode::CREATED,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_ssh_key(&self, name: &str) -> Result<()> {
        Self::send(
            self.request(Method::DELETE, &format!("/ssh-keys/{name}")),
            "remove ssh key",
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
}
