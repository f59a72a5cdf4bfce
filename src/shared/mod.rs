//! Shared kernel - common types, errors and helpers

pub mod errors;
pub mod types;
pub mod utils;
