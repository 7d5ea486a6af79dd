//! Child fragment record.
//!
//! # Responsibility
//! - Hold one embedded element as an addressable record.
//! - Track local edits against the last-synchronized snapshot.
//!
//! # Invariants
//! - `id` is fixed at creation and never re-derived from `meta.position`.
//! - Reserved metadata lives in `meta`, not in `attributes`.
//! - The owner link is plain metadata (`owner_type`, `owner_id`, `key`).

use crate::model::fragment_id::FragmentId;
use crate::model::Attributes;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Wire name of the position metadata attribute.
pub const META_POSITION: &str = "__fragmentPosition";
/// Wire name of the owner type metadata attribute.
pub const META_PARENT_TYPE: &str = "__fragmentParentType";
/// Wire name of the owner id metadata attribute.
pub const META_PARENT_ID: &str = "__fragmentParentId";
/// Wire name of the collection key metadata attribute.
pub const META_KEY: &str = "__fragmentKey";
/// Wire name of the variant type metadata attribute.
pub const META_VARIANT_TYPE: &str = "__fragmentType";

/// Keys that must never reach the wire payload of an embedded element.
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    META_POSITION,
    META_PARENT_TYPE,
    META_PARENT_ID,
    META_KEY,
    META_VARIANT_TYPE,
];

/// Returns whether `key` is reserved fragment metadata.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Reserved bookkeeping for one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMeta {
    /// Current zero-based slot among siblings.
    pub position: usize,
    pub owner_type: String,
    pub owner_id: String,
    /// Collection key on the owner, e.g. `addresses`.
    pub key: String,
    /// Discriminator for heterogeneous collections.
    pub variant_type: Option<String>,
}

/// One element of an embedded collection, tracked as its own record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildFragment {
    id: FragmentId,
    /// Fragment model name, e.g. `address`.
    pub fragment_type: String,
    pub meta: FragmentMeta,
    attributes: Attributes,
    canonical_attributes: Attributes,
    canonical_position: usize,
    is_new: bool,
    is_deleted: bool,
}

impl ChildFragment {
    /// Builds a fragment that mirrors synchronized (server) state.
    pub fn loaded(
        id: FragmentId,
        fragment_type: impl Into<String>,
        meta: FragmentMeta,
        attributes: Attributes,
    ) -> Self {
        Self {
            id,
            fragment_type: fragment_type.into(),
            canonical_position: meta.position,
            meta,
            canonical_attributes: attributes.clone(),
            attributes,
            is_new: false,
            is_deleted: false,
        }
    }

    /// Builds a fragment pending creation.
    ///
    /// The snapshot starts empty, so every attribute counts as changed.
    pub fn created(
        id: FragmentId,
        fragment_type: impl Into<String>,
        meta: FragmentMeta,
        attributes: Attributes,
    ) -> Self {
        Self {
            id,
            fragment_type: fragment_type.into(),
            canonical_position: meta.position,
            meta,
            attributes,
            canonical_attributes: Attributes::new(),
            is_new: true,
            is_deleted: false,
        }
    }

    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    pub fn position(&self) -> usize {
        self.meta.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.meta.position = position;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Sets one domain attribute and returns the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Marks this fragment for deletion; id and data stay readable.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    /// Returns whether local state differs from the snapshot.
    ///
    /// Recomputed on every call.
    pub fn is_dirty(&self) -> bool {
        self.is_new
            || self.is_deleted
            || self.meta.position != self.canonical_position
            || self.attributes != self.canonical_attributes
    }

    /// Lists changed domain attributes as `key -> (old, new)`.
    ///
    /// Removed attributes report `new = Null`; added ones report `old = Null`.
    pub fn changed_attributes(&self) -> BTreeMap<String, (Value, Value)> {
        diff_attributes(&self.canonical_attributes, &self.attributes)
    }

    /// Accepts current state as synchronized.
    pub fn commit(&mut self) {
        self.canonical_attributes = self.attributes.clone();
        self.canonical_position = self.meta.position;
        self.is_new = false;
    }

    /// Discards local edits, including a pending deletion.
    pub fn rollback(&mut self) {
        self.attributes = self.canonical_attributes.clone();
        self.meta.position = self.canonical_position;
        self.is_deleted = false;
    }

    /// Renders the store-facing resource with metadata attributes included.
    pub fn to_resource(&self) -> Value {
        let mut attributes = self.attributes.clone();
        attributes.insert(META_POSITION.to_string(), json!(self.meta.position));
        attributes.insert(META_PARENT_TYPE.to_string(), json!(self.meta.owner_type));
        attributes.insert(META_PARENT_ID.to_string(), json!(self.meta.owner_id));
        attributes.insert(META_KEY.to_string(), json!(self.meta.key));
        if let Some(variant) = &self.meta.variant_type {
            attributes.insert(META_VARIANT_TYPE.to_string(), json!(variant));
        }

        json!({
            "type": self.fragment_type,
            "id": self.id,
            "attributes": attributes,
        })
    }
}

pub(crate) fn diff_attributes(
    canonical: &Attributes,
    current: &Attributes,
) -> BTreeMap<String, (Value, Value)> {
    let mut changed = BTreeMap::new();
    for (key, value) in current {
        match canonical.get(key) {
            Some(old) if old == value => {}
            old => {
                changed.insert(
                    key.clone(),
                    (old.cloned().unwrap_or(Value::Null), value.clone()),
                );
            }
        }
    }
    for (key, old) in canonical {
        if !current.contains_key(key) {
            changed.insert(key.clone(), (old.clone(), Value::Null));
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::{ChildFragment, FragmentMeta};
    use crate::model::fragment_id::encode;
    use crate::model::Attributes;
    use serde_json::{json, Value};

    fn meta(position: usize) -> FragmentMeta {
        FragmentMeta {
            position,
            owner_type: "person".to_string(),
            owner_id: "1".to_string(),
            key: "addresses".to_string(),
            variant_type: None,
        }
    }

    fn street(value: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("street".to_string(), json!(value));
        attributes
    }

    #[test]
    fn loaded_fragment_starts_clean() {
        let id = encode("person", "1", "addresses", 0, None);
        let fragment = ChildFragment::loaded(id, "address", meta(0), street("Main"));
        assert!(!fragment.is_dirty());
        assert!(fragment.changed_attributes().is_empty());
    }

    #[test]
    fn position_change_is_dirty_until_commit() {
        let id = encode("person", "1", "addresses", 2, None);
        let mut fragment = ChildFragment::loaded(id, "address", meta(2), street("Main"));
        fragment.set_position(1);
        assert!(fragment.is_dirty());

        fragment.commit();
        assert!(!fragment.is_dirty());
        assert_eq!(fragment.id().as_str(), "person:1:addresses:2");
    }

    #[test]
    fn rollback_restores_snapshot_and_undeletes() {
        let id = encode("person", "1", "addresses", 0, None);
        let mut fragment = ChildFragment::loaded(id, "address", meta(0), street("Main"));
        fragment.set("street", json!("Oak"));
        fragment.mark_deleted();

        fragment.rollback();
        assert_eq!(fragment.get("street"), Some(&json!("Main")));
        assert!(!fragment.is_deleted());
        assert!(!fragment.is_dirty());
    }

    #[test]
    fn changed_attributes_reports_added_and_removed_keys() {
        let id = encode("person", "1", "addresses", 0, None);
        let mut fragment = ChildFragment::loaded(id, "address", meta(0), street("Main"));
        fragment.remove("street");
        fragment.set("city", json!("Springfield"));

        let changed = fragment.changed_attributes();
        assert_eq!(changed["street"], (json!("Main"), Value::Null));
        assert_eq!(changed["city"], (Value::Null, json!("Springfield")));
    }

    #[test]
    fn resource_carries_metadata_attributes() {
        let id = encode("activity", "456", "target", 0, Some("photo"));
        let mut fragment_meta = meta(0);
        fragment_meta.variant_type = Some("photo".to_string());
        let fragment = ChildFragment::loaded(id, "target", fragment_meta, Attributes::new());

        let resource = fragment.to_resource();
        assert_eq!(resource["id"], "activity:456:target:0:photo");
        assert_eq!(resource["attributes"]["__fragmentPosition"], 0);
        assert_eq!(resource["attributes"]["__fragmentType"], "photo");
    }
}
