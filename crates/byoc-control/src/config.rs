//! Configuration for byoc-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Storage backend selection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Provisioning engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Remote executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Inbound webhook configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Addon installation configuration.
    #[serde(default)]
    pub addons: AddonsConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `control.toml` in the current directory (if present)
    /// 3. Environment variables with `BYOC_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file("control.toml"))
            .merge(Env::prefixed("BYOC_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BYOC_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

const fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/byoc".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// PostgreSQL, falling back to memory when unreachable.
    #[default]
    Postgres,

    /// In-memory store; data is lost on exit.
    Memory,
}

/// Provisioning engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Which engine to use.
    #[serde(default)]
    pub kind: EngineKind,

    /// Base URL of the engine API.
    #[serde(default = "default_engine_api_url")]
    pub api_url: String,

    /// Organisation that owns the stacks.
    #[serde(default = "default_organization")]
    pub organization: String,

    /// Project the stacks belong to.
    #[serde(default = "default_project")]
    pub project: String,

    /// API access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Repository holding the infrastructure program.
    #[serde(default)]
    pub repo_url: Option<String>,

    /// Branch to deploy from.
    #[serde(default = "default_repo_branch")]
    pub repo_branch: String,

    /// Directory of the program inside the repository.
    #[serde(default = "default_repo_dir")]
    pub repo_dir: String,

    /// Request timeout in seconds.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_engine_api_url() -> String {
    "https://api.pulumi.com".to_owned()
}

fn default_organization() -> String {
    "byoc".to_owned()
}

fn default_project() -> String {
    "byoc-infra".to_owned()
}

fn default_repo_branch() -> String {
    "main".to_owned()
}

fn default_repo_dir() -> String {
    "infra".to_owned()
}

const fn default_engine_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            api_url: default_engine_api_url(),
            organization: default_organization(),
            project: default_project(),
            access_token: None,
            repo_url: None,
            repo_branch: default_repo_branch(),
            repo_dir: default_repo_dir(),
            timeout_secs: default_engine_timeout_secs(),
        }
    }
}

/// Type of provisioning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Pulumi Deployments API.
    #[default]
    Pulumi,

    /// Mock engine for testing.
    Mock,
}

/// Remote executor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Which executor to use.
    #[serde(default)]
    pub kind: ExecutorKind,

    /// Base URL of the command relay.
    #[serde(default = "default_executor_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_executor_url() -> String {
    "http://localhost:8090".to_owned()
}

const fn default_executor_timeout_secs() -> u64 {
    30
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::default(),
            url: default_executor_url(),
            timeout_secs: default_executor_timeout_secs(),
        }
    }
}

/// Type of remote executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// HTTP command relay.
    #[default]
    Relay,

    /// Mock executor for testing.
    Mock,
}

/// Inbound webhook configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for HMAC-SHA256 signatures.
    #[serde(default)]
    pub secret: Option<String>,

    /// What to do with webhooks when no secret is configured.
    #[serde(default)]
    pub unsigned: UnsignedPolicy,
}

/// Handling of webhooks when no secret is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsignedPolicy {
    /// Refuse every webhook.
    #[default]
    Reject,

    /// Process webhooks without checking signatures.
    Accept,
}

/// Addon installation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AddonsConfig {
    /// Delay between deployment success and addon install, in seconds.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Remote command timeout in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

const fn default_settle_delay_secs() -> u64 {
    90
}

const fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for AddonsConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ControlConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.engine.kind, EngineKind::Pulumi);
        assert_eq!(config.executor.kind, ExecutorKind::Relay);
        assert_eq!(config.webhook.unsigned, UnsignedPolicy::Reject);
        assert!(config.webhook.secret.is_none());
        assert_eq!(config.addons.settle_delay_secs, 90);
        assert_eq!(config.addons.command_timeout_secs, 600);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [server]
            listen_addr = "127.0.0.1:9000"

            [database]
            url = "postgres://user:pass@db:5432/byoc"
            max_connections = 20

            [store]
            backend = "memory"

            [engine]
            kind = "mock"
            organization = "acme-platform"

            [webhook]
            secret = "s3cret"
            unsigned = "accept"

            [addons]
            settle_delay_secs = 5
        "#;

        let config: ControlConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.database.url, "postgres://user:pass@db:5432/byoc");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.engine.kind, EngineKind::Mock);
        assert_eq!(config.engine.organization, "acme-platform");
        assert_eq!(config.engine.project, "byoc-infra");
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.webhook.unsigned, UnsignedPolicy::Accept);
        assert_eq!(config.addons.settle_delay_secs, 5);
        assert_eq!(config.addons.command_timeout_secs, 600);
    }
}
