//! Append-only, date-partitioned record store for generated images.
//!
//! Each generation is a PNG artifact plus a JSON sidecar sharing a stem
//! under `<root>/<YYYY-MM-DD>/`. Listing is driven entirely by sidecars.

pub mod compare;
pub mod error;
pub mod layout;
pub mod query;
pub mod record;
pub mod store;

pub use error::StoreError;
pub use query::{ListFilter, RecordListing};
pub use record::{GenerationRecord, SidecarDocument};
pub use store::{ExportedFiles, RecordStore};
