//! Foundational and often-reused types.

pub(crate) mod bucket;
pub(crate) mod id;
pub(crate) mod node;
pub(crate) mod traits;
