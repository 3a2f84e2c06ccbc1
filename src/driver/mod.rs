//! Client-side driver loop
//!
//! Repeatedly invokes the batch worker through a [`DriverBackend`], either
//! in-process ([`LocalBackend`]) or against a server's admin API
//! ([`RemoteBackend`]).

pub mod backend;
pub mod remote;
pub mod runner;

pub use backend::{BackendError, DriverBackend, LocalBackend};
pub use remote::RemoteBackend;
pub use runner::{Driver, DriverError, DriverReport, DriverState, Progress, StopReason};
