//! Domain types, validation rules, and collaborator traits for DreamCanvas.
//!
//! Nothing in this crate touches the filesystem or a model runtime; the
//! store and pipeline crates build on these definitions.

pub mod backend;
pub mod error;
pub mod generation;
pub mod preset;
pub mod provenance;
pub mod resolution;
pub mod types;
