//! Graph-aware persistence engine.
//!
//! `persist-engine` maps graphs of [`Model`](persist_core::Model)s onto rows:
//!
//! - [`CreationPlan`] orders the new models reachable from a root so key
//!   targets are inserted first wherever the graph allows it.
//! - [`DeferredQueue`] holds the field writes that need generated ids.
//! - [`Cascade`] destroys rows and applies each relation's cascade policy.
//! - [`Persistor`] ties them together behind `create`, `update`, `destroy`
//!   and the read operations.
//! - [`UnitOfWork`] is a caller-managed transaction that rolls back on drop.
//!
//! The engine is synchronous and works over any
//! [`Connection`](persist_core::Connection).

pub mod cascade;
pub mod config;
pub mod deferred;
pub mod persistor;
pub mod planner;
pub mod unit_of_work;

pub use cascade::{Cascade, DestroyStage};
pub use config::PersistorConfig;
pub use deferred::{Deferred, DeferredQueue};
pub use persistor::Persistor;
pub use planner::CreationPlan;
pub use unit_of_work::UnitOfWork;
