//! Shared value types and error helpers used across all tunegrab crates.

pub mod error;
pub mod types;

pub use error::FromMessage;
