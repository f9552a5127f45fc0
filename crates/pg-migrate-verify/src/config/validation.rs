//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{Result, VerifyError};
use crate::source::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source_a", &config.source_a)?;
    validate_database("source_b", &config.source_b)?;

    // Comparing a database with itself proves nothing
    if config.source_a.host == config.source_b.host
        && config.source_a.port == config.source_b.port
        && config.source_a.database == config.source_b.database
    {
        return Err(VerifyError::Config(
            "source_a and source_b cannot be the same database".into(),
        ));
    }

    if config.verify.chunk_size == 0 {
        return Err(VerifyError::Config(
            "verify.chunk_size must be at least 1".into(),
        ));
    }
    if config.verify.primary_key.trim().is_empty() {
        return Err(VerifyError::Config("verify.primary_key is required".into()));
    }
    if let Some(table) = &config.verify.table {
        if table.trim().is_empty() {
            return Err(VerifyError::Config(
                "verify.table must not be empty when set".into(),
            ));
        }
    }

    Ok(())
}

fn validate_database(name: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(VerifyError::Config(format!("{}.host is required", name)));
    }
    if db.database.is_empty() {
        return Err(VerifyError::Config(format!("{}.database is required", name)));
    }
    if db.user.is_empty() {
        return Err(VerifyError::Config(format!("{}.user is required", name)));
    }
    if db.max_connections == 0 {
        return Err(VerifyError::Config(format!(
            "{}.max_connections must be at least 1",
            name
        )));
    }
    db.ssl_mode.parse::<SslMode>().map_err(|_| {
        VerifyError::Config(format!(
            "{}.ssl_mode '{}' is invalid. Valid values: disable, require, verify-ca, verify-full",
            name, db.ssl_mode
        ))
    })?;
    Ok(())
}
