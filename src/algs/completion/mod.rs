//! Neighbour exchanges over the overlap: sizes first, then payloads.

pub mod data_exchange;
pub mod section_completion;
pub mod size_exchange;

pub use section_completion::{complete_fragment_sections, complete_section, complete_section_with_tags};
