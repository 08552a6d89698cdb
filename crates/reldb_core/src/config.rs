//! Store configuration.

use reldb_value::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for opening an in-memory store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create empty tables for every registered schema up front.
    pub generate_tables: bool,

    /// Seed rows inserted per table when the store opens.
    pub populate: HashMap<String, Vec<Record>>,

    /// Whether an update of an absent row inserts it instead of failing.
    pub allow_auto_insert: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generate_tables: true,
            populate: HashMap::new(),
            allow_auto_insert: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create tables for registered schemas up front.
    #[must_use]
    pub const fn generate_tables(mut self, value: bool) -> Self {
        self.generate_tables = value;
        self
    }

    /// Adds seed rows for a table.
    #[must_use]
    pub fn populate(mut self, table: impl Into<String>, rows: Vec<Record>) -> Self {
        self.populate.insert(table.into(), rows);
        self
    }

    /// Sets whether updates of absent rows auto-insert.
    #[must_use]
    pub const fn allow_auto_insert(mut self, value: bool) -> Self {
        self.allow_auto_insert = value;
        self
    }
}

/// Connection settings for an external relational backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Minimum pooled connections kept open.
    pub min_connections: usize,
    /// Maximum pooled connections.
    pub max_connections: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            min_connections: 1,
            max_connections: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.generate_tables);
        assert!(!config.allow_auto_insert);
        assert!(config.populate.is_empty());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .generate_tables(false)
            .allow_auto_insert(true)
            .populate("user", vec![Record::new()]);
        assert!(!config.generate_tables);
        assert!(config.allow_auto_insert);
        assert_eq!(config.populate["user"].len(), 1);
    }

    #[test]
    fn remote_defaults() {
        let remote = RemoteConfig::default();
        assert_eq!(remote.port, 5432);
        assert!(remote.min_connections <= remote.max_connections);
    }
}
