//! Blockchain module - header admission, cumulative work and notifications

mod chain;
mod error;
mod events;

pub use chain::*;
pub use error::*;
pub use events::*;
