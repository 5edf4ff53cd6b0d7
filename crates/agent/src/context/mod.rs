//! Context gathering for patch generation.

pub mod builder;
pub mod gatherer;

pub use builder::{merge_files, BuiltContext, ContextBuilder};
pub use gatherer::{ContextGatherer, GatheredContext, GatheredFile};
