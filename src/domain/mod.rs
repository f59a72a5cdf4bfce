//! Domain layer - AMM math, position operations and the strategy engine

pub mod amm;
pub mod position;
pub mod strategy;
