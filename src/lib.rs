//! Chainflow: orchestration runtime for billable on-chain wallet tasks.
//!
//! Swaps, bridges and deposits run as [`task::ProcessTask`]s through a
//! [`task::TaskRunner`], which gates them on user funds, bounds them with a
//! deadline, contains executor panics and reconciles persisted status with
//! billing. Chain clients, persistence, profiles and the funds service are
//! reached only through the traits in [`chain`], [`db`], [`profile`] and
//! [`billing`].

pub mod balance;
pub mod billing;
pub mod bootstrap;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod profile;
pub mod settings;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
