//! Data layer: point-indexed field storage.

pub mod atlas;
pub mod section;
