//! Shared helpers: logging setup and serde adapters.

pub mod logging;
pub mod time;
