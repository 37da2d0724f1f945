//! Caller-managed transactions.

use persist_core::{Connection, Result};

use crate::persistor::Persistor;

/// An open transaction on a persistor's connection.
///
/// Dropping a unit of work that was neither committed nor rolled back rolls
/// it back.
///
/// ```ignore
/// let uow = persistor.unit_of_work()?;
/// uow.persistor().create(&account)?;
/// uow.persistor().update(&owner)?;
/// uow.commit()?;
/// ```
#[must_use = "a unit of work rolls back when dropped"]
pub struct UnitOfWork<'p, C: Connection> {
    persistor: &'p Persistor<C>,
    finished: bool,
}

impl<'p, C: Connection> UnitOfWork<'p, C> {
    /// Open a transaction.
    pub fn begin(persistor: &'p Persistor<C>) -> Result<Self> {
        tracing::debug!("begin unit of work");
        persistor.connection().begin()?;
        Ok(Self {
            persistor,
            finished: false,
        })
    }

    /// Persistor to issue statements with.
    pub fn persistor(&self) -> &'p Persistor<C> {
        self.persistor
    }

    /// Commit the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        tracing::debug!("commit unit of work");
        self.persistor.connection().commit()
    }

    /// Roll the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        tracing::debug!("roll back unit of work");
        self.persistor.connection().rollback()
    }
}

impl<C: Connection> Drop for UnitOfWork<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!("unit of work dropped, rolling back");
        if let Err(err) = self.persistor.connection().rollback() {
            tracing::warn!(error = %err, "rollback on drop failed");
        }
    }
}
