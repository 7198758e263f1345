//! Command line interface module
//!
//! Argument parsing and the runner that turns a configuration file into a
//! running mirror.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
