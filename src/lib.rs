//! Hatlink - shared supervisor for a line-oriented device worker process.

pub mod config;
pub mod display;
pub mod node;
pub mod supervisor;
pub mod worker;
