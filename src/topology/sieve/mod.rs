//! Incidence stores, stratification and closure algebra.

pub mod in_memory;
pub mod query_ext;
pub mod sieve_trait;
pub mod strata;

pub use in_memory::InMemorySieve;
pub use query_ext::SieveQueryExt;
pub use sieve_trait::Sieve;
pub use strata::{StrataCache, compute_strata};
