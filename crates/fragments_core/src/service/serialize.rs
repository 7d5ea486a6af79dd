//! Owner + fragment records back to the nested wire payload.
//!
//! # Responsibility
//! - Rebuild each embedded array from the fragments linked to the owner.
//! - Strip fragment ids and metadata before anything reaches the wire.
//!
//! # Invariants
//! - Elements are ordered by the live `position` attribute, never by
//!   relationship order or by decoding ids.
//! - Equal positions keep relationship order (stable sort); callers must not
//!   rely on this.
//! - Fragments pending deletion are not emitted.

use crate::model::fragment::{is_reserved_key, ChildFragment};
use crate::model::parent::ParentAggregate;
use crate::model::Attributes;
use crate::repo::record_store::RecordStore;
use crate::schema::ModelSchema;
use crate::service::TransformResult;
use log::info;
use serde_json::{json, Value};

/// Output switches for owner serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Emit the owner id under the model's id key.
    pub include_id: bool,
}

/// Copies a fragment's domain attributes without any reserved key.
pub fn serialize_fragment(fragment: &ChildFragment) -> Attributes {
    fragment
        .attributes()
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Serializes fragments as one plain array ordered by position.
pub fn serialize_collection<'a>(
    fragments: impl IntoIterator<Item = &'a ChildFragment>,
) -> Vec<Value> {
    let mut live: Vec<&ChildFragment> = fragments
        .into_iter()
        .filter(|fragment| !fragment.is_deleted())
        .collect();
    live.sort_by_key(|fragment| fragment.position());
    live.into_iter()
        .map(|fragment| Value::Object(serialize_fragment(fragment)))
        .collect()
}

/// Serializes one owner with every embedded collection.
///
/// Declared collections come first in declaration order; relationship keys
/// the schema does not declare follow in key order. A declared collection
/// with no relationship serializes as an empty array.
///
/// # Errors
/// - `Store(FragmentNotFound)` when a linked id cannot be resolved.
pub fn serialize_record<S: RecordStore + ?Sized>(
    model: &ModelSchema,
    parent: &ParentAggregate,
    store: &S,
    options: SerializeOptions,
) -> TransformResult<Value> {
    let mut json = parent.attributes().clone();
    if options.include_id {
        json.insert(model.id_key.clone(), json!(parent.id()));
    }

    let declared = model.embedded.iter().map(|collection| collection.key.as_str());
    let undeclared = parent
        .relationships()
        .keys()
        .map(String::as_str)
        .filter(|key| model.collection(key).is_none());

    let mut fragment_count = 0;
    for key in declared.chain(undeclared) {
        let fragments = parent
            .relationship(key)
            .iter()
            .map(|id| store.fragment(id))
            .collect::<Result<Vec<_>, _>>()?;
        let elements = serialize_collection(fragments);
        fragment_count += elements.len();
        json.insert(key.to_string(), Value::Array(elements));
    }

    info!(
        "event=serialize module=service status=ok model_type={} fragments={}",
        parent.model_type, fragment_count
    );
    Ok(Value::Object(json))
}
