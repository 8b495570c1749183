//! The distributed computation platform of the oneloop pipeline.
//!
//! A master process owns the persistent store and drives a pool of
//! single-threaded worker processes through an ordered sequence of task
//! phases. For each phase the master asks the data manager for the
//! residual work list, scatters items dynamically over the pool,
//! collects typed result payloads and commits each one before handing
//! the producing worker its next item. Workers hold no state beyond the
//! payload they are working on.

pub mod config;
pub mod error;
pub mod master;
pub mod messages;
pub mod scheduler;
pub mod transport;
pub mod worker;

#[cfg(any(test, feature = "test"))]
pub mod testing;

pub use config::ArgumentCache;
pub use error::{CoreError, Result};
pub use master::MasterController;
pub use messages::{Message, TaskKind, WorkItem, WorkResult};
pub use scheduler::{run_phase, PhaseStats};
pub use transport::{ProcessPool, WorkerId, WorkerPool};
