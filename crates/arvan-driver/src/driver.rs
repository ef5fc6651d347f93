use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arvan_api::{CreateServerRequest, SecurityGroup, Server, SshKey};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiConnector, ArvanConnector, ComputeApi};
use crate::config::{CREATE_FLAGS, CreateFlag, DEFAULT_SSH_USER, DriverConfig, DriverOptions};
use crate::{Error, MachineDriver, MachineState, Result, ssh};

pub const DRIVER_NAME: &str = "arvan";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Called with the current configuration each time `create` records a new
/// remote resource id.
pub type Checkpoint = Arc<dyn Fn(&DriverConfig) + Send + Sync>;

/// ArvanCloud ECC driver for one machine.
pub struct ArvanDriver {
    config: DriverConfig,
    connector: Arc<dyn ApiConnector>,
    poll_interval: Duration,
    create_timeout: Duration,
    key_bits: usize,
    checkpoint: Option<Checkpoint>,
}

impl ArvanDriver {
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self::from_config(DriverConfig::new(machine_name, store_path))
    }

    /// Rebuild a driver from previously persisted configuration.
    pub fn from_config(config: DriverConfig) -> Self {
        Self {
            config,
            connector: Arc::new(ArvanConnector::default()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            key_bits: ssh::DEFAULT_KEY_BITS,
            checkpoint: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ApiConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound on how long `create` waits for the server to become active.
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Persist progress while `create` runs, so an interrupted create still
    /// leaves enough state behind for `remove`.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    fn checkpoint(&self) {
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint(&self.config);
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn into_config(self) -> DriverConfig {
        self.config
    }

    fn client(&self) -> Result<Box<dyn ComputeApi>> {
        self.config.validate()?;
        Ok(self
            .connector
            .connect(&self.config.api_token, &self.config.region))
    }

    fn server_id(&self) -> Result<&str> {
        self.config
            .server_id
            .as_deref()
            .ok_or(Error::NotSet("server id"))
    }

    async fn create_ssh_key(&mut self, api: &dyn ComputeApi) -> Result<()> {
        let name = self.config.machine_name.clone();
        let key_path = self.config.ssh_key_path();
        let bits = self.key_bits;
        let comment = name.clone();

        // RSA generation is CPU-bound; keep it off the async workers.
        let public_key =
            tokio::task::spawn_blocking(move || ssh::generate_keypair(&key_path, bits, &comment))
                .await
                .map_err(|e| Error::SshKey(format!("key generation task failed: {e}")))??;

        api.upload_ssh_key(&SshKey {
            name: name.clone(),
            public_key,
        })
        .await?;

        info!(ssh_key = %name, "arvan: ssh key uploaded");
        self.config.ssh_key_id = Some(name);
        self.checkpoint();
        Ok(())
    }

    fn server_request(&self) -> CreateServerRequest {
        CreateServerRequest {
            image: self.config.image.clone(),
            flavor: self.config.server_flavor.clone(),
            ssh_key_name: self.config.ssh_key_id.clone().unwrap_or_default(),
            name: self.config.machine_name.clone(),
            network: self.config.network.clone(),
            security_groups: vec![SecurityGroup {
                name: self.config.security_group.clone(),
            }],
            attach_ssh_key: true,
            count: 1,
        }
    }

    async fn create_server(&mut self, api: &dyn ComputeApi) -> Result<()> {
        let server_id = api.create_server(&self.server_request()).await?;
        info!(server_id = %server_id, region = %self.config.region, "arvan: server created");
        self.config.server_id = Some(server_id.clone());
        self.checkpoint();

        let server = self.wait_for_active(api, &server_id).await?;
        let ip_address = if server.ip_address.is_empty() {
            api.get_server(&server_id).await?.ip_address
        } else {
            server.ip_address
        };

        if ip_address.is_empty() {
            warn!(server_id = %server_id, "arvan: server is active but has no public address");
            self.config.ip_address = None;
        } else {
            info!(server_id = %server_id, ip = %ip_address, "arvan: server active");
            self.config.ip_address = Some(ip_address);
        }
        Ok(())
    }

    /// Poll until the server reports `active`, returning that record.
    async fn wait_for_active(&self, api: &dyn ComputeApi, server_id: &str) -> Result<Server> {
        let started = Instant::now();
        loop {
            let server = api.get_server(server_id).await?;
            let state = MachineState::from_status(&server.status);
            if state.is_running() {
                return Ok(server);
            }
            debug!(server_id, status = %server.status, %state, "arvan: waiting for server");

            if started.elapsed() >= self.create_timeout {
                return Err(Error::Timeout {
                    server_id: server_id.to_string(),
                    waited: self.create_timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl MachineDriver for ArvanDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn create_flags(&self) -> &'static [CreateFlag] {
        CREATE_FLAGS
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        self.config.apply_options(opts)
    }

    async fn create(&mut self) -> Result<()> {
        let api = self.client()?;

        self.create_ssh_key(api.as_ref()).await?;

        if let Err(e) = self.create_server(api.as_ref()).await {
            // Resources created so far are not rolled back; `remove` cleans them up.
            warn!(
                machine = %self.config.machine_name,
                ssh_key = ?self.config.ssh_key_id,
                server_id = ?self.config.server_id,
                error = %e,
                "arvan: create failed, remote resources left in place"
            );
            return Err(e);
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let server_id = self.server_id()?;
        self.client()?.start_server(server_id).await?;
        info!(server_id = %server_id, "arvan: server start requested");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let server_id = self.server_id()?;
        self.client()?.stop_server(server_id).await?;
        info!(server_id = %server_id, "arvan: server stop requested");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let server_id = self.server_id()?;
        self.client()?.restart_server(server_id).await?;
        info!(server_id = %server_id, "arvan: server restart requested");
        Ok(())
    }

    /// Delete the server, then the SSH key. A failed server delete leaves the key alone.
    async fn remove(&self) -> Result<()> {
        let api = self.client()?;

        if let Some(server_id) = self.config.server_id.as_deref() {
            api.remove_server(server_id).await?;
            info!(server_id = %server_id, "arvan: server removed");
        }

        if let Some(key) = self.config.ssh_key_id.as_deref() {
            api.remove_ssh_key(key).await?;
            info!(ssh_key = %key, "arvan: ssh key removed");
        }
        Ok(())
    }

    async fn get_state(&self) -> MachineState {
        let Some(server_id) = self.config.server_id.as_deref() else {
            return MachineState::Unprovisioned;
        };

        let api = match self.client() {
            Ok(api) => api,
            Err(e) => return MachineState::Error(e),
        };

        match api.get_server(server_id).await {
            Ok(server) => MachineState::from_status(&server.status),
            Err(e) => MachineState::Error(e.into()),
        }
    }

    fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    fn ip(&self) -> Result<String> {
        self.config
            .ip_address
            .clone()
            .filter(|ip| !ip.is_empty())
            .ok_or(Error::NotSet("ip address"))
    }

    fn ssh_username(&self) -> String {
        if self.config.ssh_user.is_empty() {
            DEFAULT_SSH_USER.to_string()
        } else {
            self.config.ssh_user.clone()
        }
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    fn ssh_key_path(&self) -> PathBuf {
        self.config.ssh_key_path()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    use arvan_api::StatusCode;

    use super::*;
    use crate::config::flag;

    /// Scripted stand-in for the compute API that records every call.
    #[derive(Default)]
    struct MockState {
        calls: Vec<String>,
        connects: usize,
        servers: VecDeque<Server>,
        fail: Vec<&'static str>,
        bystander_ran: bool,
        bystander_ran_before_upload: bool,
    }

    #[derive(Clone, Default)]
    struct MockApi(Arc<Mutex<MockState>>);

    impl MockApi {
        fn with_servers(statuses: &[(&str, &str)]) -> Self {
            let mock = Self::default();
            mock.0.lock().unwrap().servers = statuses
                .iter()
                .map(|(status, ip)| server(status, ip))
                .collect();
            mock
        }

        fn failing(self, call: &'static str) -> Self {
            self.0.lock().unwrap().fail.push(call);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().calls.clone()
        }

        fn count(&self, call: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(call)).count()
        }

        fn connects(&self) -> usize {
            self.0.lock().unwrap().connects
        }

        fn record(&self, call: &'static str, arg: &str) -> arvan_api::Result<()> {
            let mut state = self.0.lock().unwrap();
            state.calls.push(format!("{call} {arg}"));
            if state.fail.contains(&call) {
                return Err(api_error(call));
            }
            Ok(())
        }
    }

    fn server(status: &str, ip: &str) -> Server {
        Server {
            id: "srv-1".into(),
            ip_address: ip.into(),
            name: "box".into(),
            status: status.into(),
        }
    }

    fn api_error(endpoint: &'static str) -> arvan_api::Error {
        arvan_api::Error::UnexpectedStatus {
            endpoint,
            expected: StatusCode::OK,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: format!("{endpoint} exploded").into_bytes(),
        }
    }

    #[async_trait]
    impl ComputeApi for MockApi {
        async fn get_server(&self, server_id: &str) -> arvan_api::Result<Server> {
            self.record("get_server", server_id)?;
            let mut state = self.0.lock().unwrap();
            match state.servers.len() {
                0 => Ok(server("active", "")),
                // the last scripted response repeats
                1 => Ok(state.servers[0].clone()),
                _ => Ok(state.servers.pop_front().unwrap()),
            }
        }

        async fn create_server(&self, req: &CreateServerRequest) -> arvan_api::Result<String> {
            self.record("create_server", &req.name)?;
            Ok("srv-1".into())
        }

        async fn start_server(&self, server_id: &str) -> arvan_api::Result<()> {
            self.record("start_server", server_id)
        }

        async fn stop_server(&self, server_id: &str) -> arvan_api::Result<()> {
            self.record("stop_server", server_id)
        }

        async fn restart_server(&self, server_id: &str) -> arvan_api::Result<()> {
            self.record("restart_server", server_id)
        }

        async fn remove_server(&self, server_id: &str) -> arvan_api::Result<()> {
            self.record("remove_server", server_id)
        }

        async fn upload_ssh_key(&self, key: &SshKey) -> arvan_api::Result<()> {
            assert!(key.public_key.starts_with("ssh-rsa "));
            {
                let mut state = self.0.lock().unwrap();
                state.bystander_ran_before_upload = state.bystander_ran;
            }
            self.record("upload_ssh_key", &key.name)
        }

        async fn remove_ssh_key(&self, name: &str) -> arvan_api::Result<()> {
            self.record("remove_ssh_key", name)
        }
    }

    impl ApiConnector for MockApi {
        fn connect(&self, api_token: &str, _region: &str) -> Box<dyn ComputeApi> {
            assert!(!api_token.is_empty());
            self.0.lock().unwrap().connects += 1;
            Box::new(self.clone())
        }
    }

    fn driver(mock: &MockApi, store: &Path) -> ArvanDriver {
        let mut driver = ArvanDriver::new("box", store)
            .with_connector(Arc::new(mock.clone()))
            .with_poll_interval(Duration::from_millis(1))
            .with_key_bits(1024);
        driver
            .set_config_from_flags(&DriverOptions::new().with(flag::API_TOKEN, "tok"))
            .unwrap();
        driver
    }

    fn provisioned(mock: &MockApi) -> ArvanDriver {
        let mut config = DriverConfig::new("box", "/nonexistent");
        config.api_token = "tok".into();
        config.server_id = Some("srv-1".into());
        config.ssh_key_id = Some("box".into());
        config.ip_address = Some("185.8.1.2".into());
        ArvanDriver::from_config(config).with_connector(Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn key_generation_does_not_hold_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::default();
        let mut driver = driver(&mock, dir.path());

        // Single-threaded runtime: this task only runs if create yields
        // before the key is uploaded.
        let bystander = mock.clone();
        tokio::spawn(async move {
            bystander.0.lock().unwrap().bystander_ran = true;
        });

        driver.create().await.unwrap();
        assert!(mock.0.lock().unwrap().bystander_ran_before_upload);
    }

    #[tokio::test]
    async fn create_checkpoints_each_new_resource() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::with_servers(&[("build", ""), ("active", "185.8.1.2")]);
        let seen: Arc<Mutex<Vec<(Option<String>, Option<String>)>>> = Arc::default();
        let sink = seen.clone();
        let mut driver = driver(&mock, dir.path()).with_checkpoint(Arc::new(move |config| {
            sink.lock()
                .unwrap()
                .push((config.ssh_key_id.clone(), config.server_id.clone()));
        }));

        driver.create().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                (Some("box".to_string()), None),
                (Some("box".to_string()), Some("srv-1".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn create_polls_until_active_and_adopts_ip() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::with_servers(&[
            ("build", ""),
            ("build", "10.0.0.9"),
            ("active", "185.8.1.2"),
        ]);
        let mut driver = driver(&mock, dir.path());

        driver.create().await.unwrap();

        assert_eq!(mock.count("get_server"), 3);
        assert_eq!(
            &mock.calls()[..2],
            ["upload_ssh_key box", "create_server box"]
        );
        assert_eq!(driver.config().server_id.as_deref(), Some("srv-1"));
        assert_eq!(driver.config().ssh_key_id.as_deref(), Some("box"));
        assert_eq!(driver.ip().unwrap(), "185.8.1.2");
        assert_eq!(driver.url().unwrap(), "tcp://185.8.1.2:2376");
        assert!(dir.path().join("machines/box/id_rsa").exists());
        assert!(dir.path().join("machines/box/id_rsa.pub").exists());
    }

    #[tokio::test]
    async fn create_refetches_when_active_record_has_no_address() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::with_servers(&[("build", ""), ("active", ""), ("active", "185.8.1.3")]);
        let mut driver = driver(&mock, dir.path());

        driver.create().await.unwrap();

        assert_eq!(mock.count("get_server"), 3);
        assert_eq!(driver.ip().unwrap(), "185.8.1.3");
    }

    #[tokio::test]
    async fn create_times_out_when_server_never_activates() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::with_servers(&[("build", "")]);
        let mut driver = driver(&mock, dir.path()).with_create_timeout(Duration::ZERO);

        let err = driver.create().await.unwrap_err();

        assert!(
            matches!(err, Error::Timeout { ref server_id, .. } if server_id == "srv-1"),
            "{err}"
        );
        assert_eq!(mock.count("get_server"), 1);
        assert_eq!(driver.config().server_id.as_deref(), Some("srv-1"));
        assert!(driver.ip().is_err());
    }

    #[tokio::test]
    async fn create_aborts_on_key_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::default().failing("upload_ssh_key");
        let mut driver = driver(&mock, dir.path());

        let err = driver.create().await.unwrap_err();

        assert!(matches!(err, Error::Api(_)));
        assert_eq!(mock.count("create_server"), 0);
        assert_eq!(driver.config().ssh_key_id, None);
        assert_eq!(driver.config().server_id, None);
    }

    #[tokio::test]
    async fn create_leaves_key_when_server_creation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::default().failing("create_server");
        let mut driver = driver(&mock, dir.path());

        driver.create().await.unwrap_err();

        assert_eq!(mock.count("remove_ssh_key"), 0);
        assert_eq!(driver.config().ssh_key_id.as_deref(), Some("box"));
        assert_eq!(driver.config().server_id, None);
    }

    #[tokio::test]
    async fn create_surfaces_poll_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockApi::default().failing("get_server");
        let mut driver = driver(&mock, dir.path());

        let err = driver.create().await.unwrap_err();

        assert!(matches!(err, Error::Api(_)));
        assert_eq!(mock.count("get_server"), 1);
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_call() {
        let mock = MockApi::default();
        let mut driver =
            ArvanDriver::new("box", "/nonexistent").with_connector(Arc::new(mock.clone()));

        let err = driver
            .set_config_from_flags(&DriverOptions::new().with(flag::REGION, "ir-thr-c2"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = driver.create().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert_eq!(mock.connects(), 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_server_then_key() {
        let mock = MockApi::default();
        provisioned(&mock).remove().await.unwrap();

        assert_eq!(mock.calls(), ["remove_server srv-1", "remove_ssh_key box"]);
    }

    #[tokio::test]
    async fn remove_stops_when_server_delete_fails() {
        let mock = MockApi::default().failing("remove_server");

        let err = provisioned(&mock).remove().await.unwrap_err();

        assert_eq!(mock.count("remove_ssh_key"), 0);
        match err {
            Error::Api(arvan_api::Error::UnexpectedStatus { endpoint, body, .. }) => {
                assert_eq!(endpoint, "remove_server");
                assert_eq!(body, b"remove_server exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn remove_surfaces_key_delete_failure() {
        let mock = MockApi::default().failing("remove_ssh_key");

        let err = provisioned(&mock).remove().await.unwrap_err();

        assert_eq!(mock.count("remove_server"), 1);
        assert!(
            matches!(err, Error::Api(arvan_api::Error::UnexpectedStatus { endpoint: "remove_ssh_key", .. }))
        );
    }

    #[tokio::test]
    async fn remove_cleans_orphaned_key_without_server() {
        let mock = MockApi::default();
        let mut driver = provisioned(&mock);
        driver.config.server_id = None;

        driver.remove().await.unwrap();

        assert_eq!(mock.calls(), ["remove_ssh_key box"]);
    }

    #[tokio::test]
    async fn power_actions_pass_through() {
        let mock = MockApi::default();
        let driver = provisioned(&mock);

        driver.start().await.unwrap();
        driver.stop().await.unwrap();
        driver.restart().await.unwrap();
        driver.kill().await.unwrap();

        assert_eq!(
            mock.calls(),
            [
                "start_server srv-1",
                "stop_server srv-1",
                "restart_server srv-1",
                "stop_server srv-1"
            ]
        );
    }

    #[tokio::test]
    async fn power_actions_need_a_server() {
        let mock = MockApi::default();
        let mut driver = provisioned(&mock);
        driver.config.server_id = None;

        assert!(matches!(driver.start().await, Err(Error::NotSet("server id"))));
        assert_eq!(mock.connects(), 0);
    }

    #[tokio::test]
    async fn get_state_maps_status_and_errors() {
        let mock = MockApi::with_servers(&[("stop", "")]);
        assert!(matches!(provisioned(&mock).get_state().await, MachineState::Stopped));

        let mock = MockApi::with_servers(&[("resize", "")]);
        assert!(
            matches!(provisioned(&mock).get_state().await, MachineState::Unknown(ref s) if s == "resize")
        );

        let mock = MockApi::default().failing("get_server");
        match provisioned(&mock).get_state().await {
            MachineState::Error(Error::Api(arvan_api::Error::UnexpectedStatus { body, .. })) => {
                assert_eq!(body, b"get_server exploded");
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_state_without_server_makes_no_call() {
        let mock = MockApi::default();
        let dir = tempfile::tempdir().unwrap();

        let state = driver(&mock, dir.path()).get_state().await;

        assert!(matches!(state, MachineState::Unprovisioned));
        assert_eq!(mock.connects(), 0);
    }

    #[test]
    fn accessors_follow_config() {
        let mock = MockApi::default();
        let mut driver = provisioned(&mock);

        assert_eq!(driver.driver_name(), "arvan");
        assert_eq!(driver.ssh_hostname().unwrap(), "185.8.1.2");
        assert_eq!(driver.ssh_port(), 22);
        assert_eq!(driver.ssh_username(), "ubuntu");

        driver.config.ssh_user = String::new();
        assert_eq!(driver.ssh_username(), "ubuntu");

        driver.config.ip_address = None;
        assert!(matches!(driver.url(), Err(Error::NotSet("ip address"))));
    }
}
