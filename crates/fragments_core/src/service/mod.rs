//! Fragment transforms and use-case services.
//!
//! # Responsibility
//! - Convert nested wire payloads into owner + fragment records and back.
//! - Keep sibling positions contiguous and fold fragment dirtiness into
//!   the owner.
//!
//! # Invariants
//! - Fragment ids are only minted at normalize/append time.
//! - Serialized payloads never carry fragment ids or metadata.

pub mod dirty;
pub mod fragment_service;
pub mod normalize;
pub mod reconcile;
pub mod serialize;

use crate::model::fragment_id::FragmentId;
use crate::repo::record_store::StoreError;
use crate::schema::SchemaError;
use thiserror::Error;

pub type TransformResult<T> = Result<T, TransformError>;

/// Errors from normalize/serialize and fragment use-cases.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("payload for `{model_type}` must be a JSON object")]
    PayloadNotObject { model_type: String },
    #[error("payload for `{model_type}` has no usable `{id_key}`")]
    MissingOwnerId { model_type: String, id_key: String },
    #[error("owner id `{0}` must not be blank or contain `:`")]
    InvalidOwnerId(String),
    #[error("variant `{variant}` under `{key}` must not contain `:`")]
    InvalidVariant { key: String, variant: String },
    #[error("model `{model_type}` has no embedded collection `{key}`")]
    UnknownCollection { model_type: String, key: String },
    #[error("fragment {id} is not linked under `{key}`")]
    FragmentNotLinked { key: String, id: FragmentId },
    #[error("index {index} is out of range for `{key}` with {len} fragment(s)")]
    IndexOutOfRange { key: String, index: usize, len: usize },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
