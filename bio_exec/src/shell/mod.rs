//! # Shell Module
//!
//! Entry point and CLI logic for the `bio_exec` binary.

pub mod cli;

pub use cli::{Cli, Command, run};
