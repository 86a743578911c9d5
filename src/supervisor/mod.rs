//! Supervisor module for worker lifecycle and client management.

mod client;
mod registry;
mod runner;
mod state;
mod timer;

pub use client::*;
pub use registry::*;
pub use runner::*;
pub use state::*;
