//! Generation pipeline: backend registry, batch engine, the offline
//! synthetic backend, reproduce-from-record and the [`studio::Studio`]
//! facade.

pub mod engine;
pub mod error;
pub mod registry;
pub mod reproduce;
pub mod studio;
pub mod synthetic;

pub use engine::{GenerationBatch, GenerationEngine};
pub use error::{GenerationError, ReproduceError, StudioError};
pub use registry::BackendRegistry;
pub use studio::Studio;
