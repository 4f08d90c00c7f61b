//! Storage module - memory-mapped ring files of block headers

mod btc;
mod codec;
mod error;
mod flavor;
mod lock;
mod mapped;
mod ring;
mod vbk;

pub use btc::*;
pub use codec::*;
pub use error::*;
pub use flavor::*;
pub use lock::*;
pub use mapped::*;
pub use ring::*;
pub use vbk::*;
