//! Huntr CLI library
//!
//! Exposes the command modules for integration testing.

pub mod cli;

pub use cli::{cmd_run, cmd_validate, RunArgs, ValidateArgs};
