//! Strata Ports
//!
//! Port definitions (traits) for the collaborators the cache core consumes.
//! These define the boundaries between the cache and the outside world:
//! a durable backing store and a stream of decoded exchange events.

mod error;
mod source;
mod store;

pub use error::{SourceError, StoreError, StoreResult};
pub use source::IngestionSource;
pub use store::BackingStore;
