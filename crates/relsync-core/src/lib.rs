//! Core library for relsync.
//!
//! Synchronises a local directory of release artifacts with a remote
//! (object store, plain HTTP mirror, local directory or the hosted release
//! service), merges release indexes with a retention policy, and computes
//! the update path a client should take.

pub mod config;
pub mod delta;
#[cfg(feature = "network")]
pub mod hosted;
pub mod merge;
pub mod pipeline;
pub mod reporter;
pub mod resolver;
pub mod retry;
pub mod rollout;
pub mod transport;

pub use config::SyncConfig;
pub use merge::{MergeOutcome, RemoteSnapshot, merge};
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use resolver::{Resolution, ResolvePolicy, resolve};
pub use retry::RetryPolicy;
pub use rollout::{RolloutGate, UserId};

/// User Agent string for remote requests
pub const USER_AGENT: &str = concat!("relsync/", env!("CARGO_PKG_VERSION"));
