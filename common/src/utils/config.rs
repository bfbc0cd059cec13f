use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    /// Chunk derivation may involve heavy document parsing on the remote side.
    #[serde(default = "default_derive_timeout_secs")]
    pub gateway_derive_timeout_secs: u64,
    #[serde(default = "default_answer_timeout_secs")]
    pub gateway_answer_timeout_secs: u64,
    #[serde(default = "default_upload_max_body_bytes")]
    pub upload_max_body_bytes: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_gateway_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_derive_timeout_secs() -> u64 {
    300
}

fn default_answer_timeout_secs() -> u64 {
    60
}

fn default_upload_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Configuration suitable for tests: in-memory everything, no network.
    pub fn for_tests() -> Self {
        Self {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            data_dir: "/tmp/unused".into(),
            http_port: 0,
            storage: StorageKind::Memory,
            gateway_base_url: "http://localhost:0".into(),
            gateway_derive_timeout_secs: 1,
            gateway_answer_timeout_secs: 1,
            upload_max_body_bytes: default_upload_max_body_bytes(),
        }
    }
}
