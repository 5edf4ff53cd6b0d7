//! Row structs and conversions.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row plus conversions to and from the core domain types.

pub mod patch;
