//! Error type shared by every layer of the engine.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed driver error, propagated to callers untouched.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the persistence engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Schema metadata is inconsistent or a relation cannot be resolved.
    ///
    /// This indicates a programming/configuration bug and is never retried.
    #[error("schema error: {0}")]
    Schema(String),

    /// `create` was called on a model that already has an id.
    #[error("model has already been created: {model}")]
    AlreadyPersisted {
        /// Simple description of the model (`Type:id`).
        model: String,
    },

    /// `update`/`destroy` was called on a model without a positive id.
    #[error("id has not yet been set for {model}")]
    NotPersisted {
        /// Simple description of the model.
        model: String,
    },

    /// An UPDATE matched no row: the record vanished underneath the caller.
    #[error("could not update {model}:{id} (does not exist in database)")]
    NotFound {
        /// Model type name.
        model: String,
        /// The id the statement targeted.
        id: i64,
    },

    /// A create would insert a row without any column.
    #[error("can not create an empty model: {model}")]
    EmptyModel {
        /// Simple description of the model.
        model: String,
    },

    /// The driver executed the INSERT but reported no generated id.
    #[error("could not create record for {model}")]
    CreateFailed {
        /// Simple description of the model.
        model: String,
    },

    /// The requested write is not supported (e.g. through a `through` field).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A query fragment could not be interpreted.
    #[error("invalid query: {0}")]
    Query(String),

    /// Failure reported by the underlying driver.
    #[error(transparent)]
    Driver(DriverError),
}

impl Error {
    /// Wrap a driver error.
    pub fn driver(err: impl Into<DriverError>) -> Self {
        Error::Driver(err.into())
    }

    /// Build a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Whether this error stems from bad metadata rather than runtime state.
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Whether this error reports a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
