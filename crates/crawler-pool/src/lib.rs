//! Credential worker pool and crawl orchestrator
//!
//! The pool owns one worker per credential and hands them out under
//! exclusive leases; concurrency across the whole crawl is naturally bounded
//! by the number of credentials. A run opens with `begin` (which opens the
//! store's write scope), drives any number of orchestrated job lists through
//! the pool, and closes with `end`, which commits the write scope and
//! reports per-credential rate usage.
//!
//! The orchestrator fans a job list out across the pool, cancels dispatch of
//! remaining jobs on the first failure, drains in-flight jobs to completion,
//! and returns exactly that first error.

pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod worker;

pub use error::{Error, Result};
pub use orchestrator::{ResourceKind, run_jobs};
pub use pool::{RunStats, WorkerPool};
pub use worker::{CredentialWorker, RateUsage};
