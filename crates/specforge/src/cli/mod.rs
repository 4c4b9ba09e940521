//! CLI module for specforge
//!
//! One submodule per subcommand, plus shared error and output
//! helpers. Argument structs live next to their command so `main.rs`
//! stays a thin dispatch layer.

pub mod error;
pub mod output;

pub mod bridge;
pub mod classify;
pub mod run;
