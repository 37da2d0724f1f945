//! SQLite connection configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How to open a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Enforce foreign key constraints (`PRAGMA foreign_keys`).
    pub foreign_keys: bool,
    /// How long to wait on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    /// In-memory database with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the database file at `path`.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Whether this configuration opens an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.is_none()
    }
}
