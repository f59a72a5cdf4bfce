//! Infrastructure layer - chain access and telemetry

pub mod chain;
pub mod telemetry;
