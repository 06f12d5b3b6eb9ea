//! Shared-point bookkeeping between ranks.

pub mod overlap;

pub use overlap::{Overlap, Remote};
