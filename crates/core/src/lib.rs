//! Pure domain logic for the AI admin patch pipeline.
//!
//! Everything in this crate is free of I/O: patch types, the structural
//! validator, quality assessment, keyword extraction and path scoring, and
//! framework classification. The `agent` crate wires these into network and
//! filesystem calls.

pub mod analysis;
pub mod context;
pub mod conventions;
pub mod error;
pub mod patch;
pub mod roles;
pub mod types;
pub mod validation;
