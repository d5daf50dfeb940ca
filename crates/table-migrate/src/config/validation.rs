//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("destination", &config.destination)?;

    // Cannot copy a table onto itself
    if config.source.host == config.destination.host
        && config.source.port == config.destination.port
        && config.source.database == config.destination.database
        && config.source.schema == config.destination.schema
        && config.source.table == config.destination.table
    {
        return Err(MigrateError::Config(
            "source and destination cannot be the same table".into(),
        ));
    }

    let m = &config.migration;
    if m.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if m.drain_window_secs == 0 {
        return Err(MigrateError::Config(
            "migration.drain_window_secs must be at least 1".into(),
        ));
    }
    if let Some(0) = m.drain_patience {
        return Err(MigrateError::Config(
            "migration.drain_patience must be at least 1 when set".into(),
        ));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    for (field, value) in [
        ("host", &db.host),
        ("database", &db.database),
        ("user", &db.user),
        ("schema", &db.schema),
        ("table", &db.table),
    ] {
        if value.is_empty() {
            return Err(MigrateError::Config(format!("{side}.{field} is required")));
        }
    }

    if let Some(0) = db.max_connections {
        return Err(MigrateError::Config(format!(
            "{side}.max_connections must be at least 1"
        )));
    }

    SslMode::parse(&db.ssl_mode)
        .map_err(|e| MigrateError::Config(format!("{side}: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;

    fn database(host: &str, table: &str) -> DatabaseConfig {
        DatabaseConfig {
            host: host.to_string(),
            port: 5432,
            database: "app".to_string(),
            user: "postgres".to_string(),
            password: "password".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: None,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: database("old-db", "orders"),
            destination: database("new-db", "orders"),
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.host is required"));
    }

    #[test]
    fn test_missing_destination_table() {
        let mut config = valid_config();
        config.destination.table = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("destination.table is required"));
    }

    #[test]
    fn test_same_table_rejected() {
        let mut config = valid_config();
        config.destination.host = config.source.host.clone();
        assert!(validate(&config).is_err());

        config.destination.table = "orders_copy".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_zero_drain_settings_rejected() {
        let mut config = valid_config();
        config.migration.drain_window_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.migration.drain_patience = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let mut config = valid_config();
        config.destination.max_connections = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
