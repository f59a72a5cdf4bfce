//! Strategy layer - phases, failure policy, stability detection, engine

pub mod circuit_breaker;
pub mod engine;
pub mod phase;
pub mod stability;

pub use circuit_breaker::CircuitBreaker;
pub use engine::{StrategyEngine, StrategyState};
pub use phase::Phase;
pub use stability::StabilityWindow;
