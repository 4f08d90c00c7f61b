//! Consensus module - headers, difficulty, network parameters and checks

mod block;
mod difficulty;
mod params;
mod validation;

pub use block::*;
pub use difficulty::*;
pub use params::*;
pub use validation::*;
