use arvan_api::{ArvanClient, CreateServerRequest, Server, SshKey};
use async_trait::async_trait;

/// The compute API surface the driver depends on.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_server(&self, server_id: &str) -> arvan_api::Result<Server>;

    /// Create a server and return its id.
    async fn create_server(&self, req: &CreateServerRequest) -> arvan_api::Result<String>;

    async fn start_server(&self, server_id: &str) -> arvan_api::Result<()>;

    async fn stop_server(&self, server_id: &str) -> arvan_api::Result<()>;

    async fn restart_server(&self, server_id: &str) -> arvan_api::Result<()>;

    async fn remove_server(&self, server_id: &str) -> arvan_api::Result<()>;

    async fn upload_ssh_key(&self, key: &SshKey) -> arvan_api::Result<()>;

    async fn remove_ssh_key(&self, name: &str) -> arvan_api::Result<()>;
}

#[async_trait]
impl ComputeApi for ArvanClient {
    async fn get_server(&self, server_id: &str) -> arvan_api::Result<Server> {
        ArvanClient::get_server(self, server_id).await
    }

    async fn create_server(&self, req: &CreateServerRequest) -> arvan_api::Result<String> {
        ArvanClient::create_server(self, req).await
    }

    async fn start_server(&self, server_id: &str) -> arvan_api::Result<()> {
        ArvanClient::start_server(self, server_id).await
    }

    async fn stop_server(&self, server_id: &str) -> arvan_api::Result<()> {
        ArvanClient::stop_server(self, server_id).await
    }

    async fn restart_server(&self, server_id: &str) -> arvan_api::Result<()> {
        ArvanClient::restart_server(self, server_id).await
    }

    async fn remove_server(&self, server_id: &str) -> arvan_api::Result<()> {
        ArvanClient::remove_server(self, server_id).await
    }

    async fn upload_ssh_key(&self, key: &SshKey) -> arvan_api::Result<()> {
        ArvanClient::upload_ssh_key(self, key).await
    }

    async fn remove_ssh_key(&self, name: &str) -> arvan_api::Result<()> {
        ArvanClient::remove_ssh_key(self, name).await
    }
}

/// Builds an API client for a token and region.
///
/// The driver connects once per lifecycle call, after its configuration has
/// been validated.
pub trait ApiConnector: Send + Sync {
    fn connect(&self, api_token: &str, region: &str) -> Box<dyn ComputeApi>;
}

/// Connects to the real ArvanCloud endpoint.
#[derive(Debug, Clone)]
pub struct ArvanConnector {
    base_url: String,
}

impl ArvanConnector {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for ArvanConnector {
    fn default() -> Self {
        Self::with_base_url(arvan_api::BASE_URL)
    }
}

impl ApiConnector for ArvanConnector {
    fn connect(&self, api_token: &str, region: &str) -> Box<dyn ComputeApi> {
        Box::new(ArvanClient::with_base_url(
            self.base_url.clone(),
            api_token,
            region,
        ))
    }
}
