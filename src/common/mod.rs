//! Shared utilities used by every layer of the crate.

pub mod logger;
pub mod time;
