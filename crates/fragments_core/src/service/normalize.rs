//! Nested payload to owner + fragment records.
//!
//! # Responsibility
//! - Replace each embedded array with an ordered relationship of
//!   synthesized fragment ids.
//! - Produce the side list of fragment records for the store.
//!
//! # Invariants
//! - Element `i` always gets `position = i` and the id encoded from `i`.
//! - A missing, null or empty array yields an empty relationship, never an
//!   absent one.
//! - Element attributes are copied without validation.

use crate::model::fragment::{ChildFragment, FragmentMeta};
use crate::model::fragment_id::{FragmentId, FragmentIdCodec, ID_SEPARATOR};
use crate::model::parent::{ParentAggregate, Relationships};
use crate::model::Attributes;
use crate::schema::{EmbeddedCollection, Schema};
use crate::service::{TransformError, TransformResult};
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Owner record plus the fragments synthesized from its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub parent: ParentAggregate,
    /// Fragments in collection declaration order, then element order.
    pub fragments: Vec<ChildFragment>,
}

impl NormalizedDocument {
    /// Ordered fragment ids for one collection key.
    pub fn fragment_ids(&self, key: &str) -> &[FragmentId] {
        self.parent.relationship(key)
    }

    pub fn fragment(&self, id: &FragmentId) -> Option<&ChildFragment> {
        self.fragments.iter().find(|fragment| fragment.id() == id)
    }

    /// Renders a `{ data, included }` resource document.
    ///
    /// Fragment resources in `included` carry their metadata attributes.
    pub fn to_json(&self) -> Value {
        let by_id: HashMap<&FragmentId, &ChildFragment> = self
            .fragments
            .iter()
            .map(|fragment| (fragment.id(), fragment))
            .collect();

        let mut relationships = Map::new();
        for (key, ids) in self.parent.relationships() {
            let data: Vec<Value> = ids
                .iter()
                .map(|id| {
                    let fragment_type = by_id
                        .get(id)
                        .map(|fragment| fragment.fragment_type.as_str());
                    json!({ "type": fragment_type, "id": id })
                })
                .collect();
            relationships.insert(key.clone(), json!({ "data": data }));
        }

        let included: Vec<Value> = self.fragments.iter().map(ChildFragment::to_resource).collect();

        json!({
            "data": {
                "type": self.parent.model_type,
                "id": self.parent.id(),
                "attributes": self.parent.attributes(),
                "relationships": relationships,
            },
            "included": included,
        })
    }
}

/// Payload normalizer bound to a schema and an id codec.
pub struct Normalizer<'a, C: FragmentIdCodec> {
    schema: &'a Schema,
    codec: &'a C,
}

impl<'a, C: FragmentIdCodec> Normalizer<'a, C> {
    pub fn new(schema: &'a Schema, codec: &'a C) -> Self {
        Self { schema, codec }
    }

    /// Normalizes one owner payload.
    ///
    /// `fallback_id` is used when the payload carries no usable owner id.
    ///
    /// # Errors
    /// - `Schema(UnknownModel)` when `model_type` is not declared.
    /// - `PayloadNotObject`, `MissingOwnerId` or `InvalidOwnerId` for an
    ///   unusable payload.
    pub fn normalize(
        &self,
        model_type: &str,
        payload: &Value,
        fallback_id: Option<&str>,
    ) -> TransformResult<NormalizedDocument> {
        let model = self.schema.model(model_type)?;
        let object = payload
            .as_object()
            .ok_or_else(|| TransformError::PayloadNotObject {
                model_type: model_type.to_string(),
            })?;

        let owner_id = object
            .get(&model.id_key)
            .and_then(owner_id_to_string)
            .or_else(|| fallback_id.map(str::to_string))
            .ok_or_else(|| TransformError::MissingOwnerId {
                model_type: model_type.to_string(),
                id_key: model.id_key.clone(),
            })?;
        validate_owner_id(&owner_id)?;

        let mut attributes = object.clone();
        attributes.remove(&model.id_key);

        let mut relationships = Relationships::new();
        let mut fragments = Vec::new();
        for collection in &model.embedded {
            let elements = match attributes.remove(&collection.key) {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => {
                    warn!(
                        "event=normalize module=service status=warn model_type={} key={} \
                         reason=not_an_array",
                        model_type, collection.key
                    );
                    Vec::new()
                }
            };

            let mut ids = Vec::with_capacity(elements.len());
            for (position, element) in elements.iter().enumerate() {
                let fragment =
                    self.synthesize(model_type, &owner_id, collection, position, element)?;
                ids.push(fragment.id().clone());
                fragments.push(fragment);
            }
            relationships.insert(collection.key.clone(), ids);
        }

        info!(
            "event=normalize module=service status=ok model_type={} collections={} fragments={}",
            model_type,
            relationships.len(),
            fragments.len()
        );

        Ok(NormalizedDocument {
            parent: ParentAggregate::loaded(model_type, owner_id, attributes, relationships),
            fragments,
        })
    }

    fn synthesize(
        &self,
        owner_type: &str,
        owner_id: &str,
        collection: &EmbeddedCollection,
        position: usize,
        element: &Value,
    ) -> TransformResult<ChildFragment> {
        let attributes = match element.as_object() {
            Some(source) => pick_attributes(source, collection),
            None => {
                warn!(
                    "event=normalize module=service status=warn model_type={} key={} \
                     position={} reason=element_not_an_object",
                    owner_type, collection.key, position
                );
                Attributes::new()
            }
        };
        let variant_type = variant_of(element.as_object(), collection)?;
        let id = self.codec.encode(
            owner_type,
            owner_id,
            &collection.key,
            position,
            variant_type.as_deref(),
        );

        Ok(ChildFragment::loaded(
            id,
            collection.fragment_type.as_str(),
            FragmentMeta {
                position,
                owner_type: owner_type.to_string(),
                owner_id: owner_id.to_string(),
                key: collection.key.clone(),
                variant_type,
            },
            attributes,
        ))
    }
}

/// Copies element attributes, honoring the collection allow-list.
///
/// Allow-listed keys missing from the element stay absent.
pub(crate) fn pick_attributes(source: &Attributes, collection: &EmbeddedCollection) -> Attributes {
    match &collection.attributes {
        None => source.clone(),
        Some(allowed) => allowed
            .iter()
            .filter_map(|key| source.get(key).map(|value| (key.clone(), value.clone())))
            .collect(),
    }
}

/// Reads the variant discriminator for heterogeneous collections.
///
/// # Errors
/// - `InvalidVariant` when the value contains the id separator.
pub(crate) fn variant_of(
    source: Option<&Attributes>,
    collection: &EmbeddedCollection,
) -> TransformResult<Option<String>> {
    let variant = collection.variant_key.as_deref().and_then(|variant_key| {
        source?
            .get(variant_key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    });
    match variant {
        Some(value) if value.contains(ID_SEPARATOR) => Err(TransformError::InvalidVariant {
            key: collection.key.clone(),
            variant: value.to_string(),
        }),
        other => Ok(other.map(str::to_string)),
    }
}

pub(crate) fn validate_owner_id(owner_id: &str) -> TransformResult<()> {
    if owner_id.trim().is_empty() || owner_id.contains(ID_SEPARATOR) {
        return Err(TransformError::InvalidOwnerId(owner_id.to_string()));
    }
    Ok(())
}

fn owner_id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
