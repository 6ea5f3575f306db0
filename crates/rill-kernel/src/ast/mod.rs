//! Abstract syntax tree for rill source.

mod types;

pub use types::*;
