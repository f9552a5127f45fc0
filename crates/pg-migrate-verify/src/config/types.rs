//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pre-migration database ("A").
    pub source_a: DatabaseConfig,

    /// Post-migration database ("B").
    pub source_b: DatabaseConfig,

    /// Verification behavior.
    #[serde(default)]
    pub verify: VerifySettings,
}

/// PostgreSQL connection settings for one side.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema holding the table (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Verification behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySettings {
    /// Table to verify. Discovered from the schema when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Primary key column (default: "id").
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Rows fetched per chunk from each side (default: 100).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory for report files (default: "reports").
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            table: None,
            primary_key: default_primary_key(),
            chunk_size: default_chunk_size(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_max_connections() -> usize {
    2
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_chunk_size() -> usize {
    100
}

fn default_report_dir() -> String {
    "reports".to_string()
}
