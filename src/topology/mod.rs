//! Top-level module for mesh topology abstractions.
//!
//! This module provides the core types for representing a mesh as a sieve:
//! - [`point::PointId`] handles and [`arrow::Arrow`] incidences,
//! - the [`Sieve`] trait, the arena-backed [`InMemorySieve`] and its
//!   stratification cache,
//! - the closure algebra ([`SieveQueryExt`]),
//! - orientation bookkeeping and integer point labels.

pub mod arrow;
pub mod labels;
pub mod orientation;
pub mod point;
pub mod sieve;

pub use labels::{LABEL_UNSET, LabelSet, MARKER_LABEL};
pub use sieve::*;
