//! Embedded fragment collections as addressable client-side records.
//!
//! Nested wire arrays (e.g. a person's `addresses`) are normalized into an
//! owner record plus one fragment record per element, each named by a
//! positional id such as `person:1:addresses:0`. Fragments are edited,
//! appended, removed and moved as records, fold their dirtiness into the
//! owner, and serialize back to the plain nested array.

pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::fragment::{ChildFragment, FragmentMeta, RESERVED_KEYS};
pub use model::fragment_id::{
    decode, encode, looks_like_fragment_id, value_looks_like_fragment_id, ColonCodec, FragmentId,
    FragmentIdCodec, FragmentIdError, FragmentIdParts,
};
pub use model::parent::{ParentAggregate, Relationships};
pub use model::Attributes;
pub use repo::record_store::{MemoryRecordStore, ParentKey, RecordStore, StoreError, StoreResult};
pub use schema::{EmbeddedCollection, ModelSchema, Schema, SchemaError};
pub use service::fragment_service::FragmentService;
pub use service::normalize::{NormalizedDocument, Normalizer};
pub use service::serialize::SerializeOptions;
pub use service::{TransformError, TransformResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
