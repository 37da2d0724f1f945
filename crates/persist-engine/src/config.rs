//! Persistor configuration.

use persist_core::Dialect;

/// Configuration for [`Persistor`](crate::Persistor) behavior.
#[derive(Debug, Clone)]
pub struct PersistorConfig {
    /// Dialect to generate SQL for; `None` asks the connection.
    pub dialect: Option<Dialect>,
    /// Whether to maintain `created_*` / `updated_*` stamp columns.
    pub auto_stamps: bool,
}

impl Default for PersistorConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            auto_stamps: true,
        }
    }
}

impl PersistorConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate SQL for `dialect` regardless of the connection.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Enable or disable automatic stamp columns.
    pub fn auto_stamps(mut self, enabled: bool) -> Self {
        self.auto_stamps = enabled;
        self
    }

    /// The dialect in effect for a connection speaking `connection_dialect`.
    pub fn resolve_dialect(&self, connection_dialect: Dialect) -> Dialect {
        self.dialect.unwrap_or(connection_dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_connection() {
        let config = PersistorConfig::new();
        assert!(config.auto_stamps);
        assert_eq!(config.resolve_dialect(Dialect::Sqlite), Dialect::Sqlite);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PersistorConfig::new()
            .dialect(Dialect::Mysql)
            .auto_stamps(false);
        assert!(!config.auto_stamps);
        assert_eq!(config.resolve_dialect(Dialect::Sqlite), Dialect::Mysql);
    }
}
