//! Parent aggregate record.
//!
//! # Responsibility
//! - Hold the owner's plain attributes and its ordered fragment
//!   relationships as two separate fields.
//! - Track own dirtiness (attributes, relationship membership, lifecycle).
//!
//! # Invariants
//! - Embedded collections never live in `attributes`; they are converted to
//!   relationships at the normalize boundary.
//! - Relationship order is the order fragments were linked or moved into.

use crate::model::fragment::diff_attributes;
use crate::model::fragment_id::FragmentId;
use crate::model::Attributes;
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered fragment ids per collection key.
pub type Relationships = BTreeMap<String, Vec<FragmentId>>;

/// Owning record that embeds one or more fragment collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentAggregate {
    /// Owner model name, e.g. `person`.
    pub model_type: String,
    id: String,
    attributes: Attributes,
    relationships: Relationships,
    canonical_attributes: Attributes,
    canonical_relationships: Relationships,
    is_new: bool,
    is_deleted: bool,
    canonical_deleted: bool,
}

impl ParentAggregate {
    /// Builds a parent that mirrors synchronized (server) state.
    pub fn loaded(
        model_type: impl Into<String>,
        id: impl Into<String>,
        attributes: Attributes,
        relationships: Relationships,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            id: id.into(),
            canonical_attributes: attributes.clone(),
            canonical_relationships: relationships.clone(),
            attributes,
            relationships,
            is_new: false,
            is_deleted: false,
            canonical_deleted: false,
        }
    }

    /// Builds a parent pending creation with empty relationships.
    pub fn created(
        model_type: impl Into<String>,
        id: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            id: id.into(),
            attributes,
            relationships: Relationships::new(),
            canonical_attributes: Attributes::new(),
            canonical_relationships: Relationships::new(),
            is_new: true,
            is_deleted: false,
            canonical_deleted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Sets one plain attribute and returns the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    pub fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    /// Linked fragment ids for `key`; empty when the key was never linked.
    pub fn relationship(&self, key: &str) -> &[FragmentId] {
        self.relationships
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn relationship_mut(&mut self, key: &str) -> &mut Vec<FragmentId> {
        self.relationships.entry(key.to_string()).or_default()
    }

    /// Replaces the ordered relationship for `key`.
    pub fn set_relationship(&mut self, key: impl Into<String>, ids: Vec<FragmentId>) {
        self.relationships.insert(key.into(), ids);
    }

    /// Every linked fragment id across all collection keys.
    pub fn linked_fragment_ids(&self) -> impl Iterator<Item = &FragmentId> {
        self.relationships.values().flatten()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    /// Own dirtiness only; fragments are folded in by dirty propagation.
    pub fn has_dirty_attributes(&self) -> bool {
        self.is_new
            || self.is_deleted != self.canonical_deleted
            || self.attributes != self.canonical_attributes
            || self.relationships_changed()
    }

    /// Returns whether linked ids or their order differ from the snapshot.
    ///
    /// A key that is missing on one side and empty on the other is unchanged.
    pub fn relationships_changed(&self) -> bool {
        let keys = self
            .relationships
            .keys()
            .chain(self.canonical_relationships.keys());
        for key in keys {
            let current = self.relationships.get(key).map(Vec::as_slice).unwrap_or(&[]);
            let canonical = self
                .canonical_relationships
                .get(key)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if current != canonical {
                return true;
            }
        }
        false
    }

    /// Lists changed plain attributes as `key -> (old, new)`.
    pub fn changed_attributes(&self) -> BTreeMap<String, (Value, Value)> {
        diff_attributes(&self.canonical_attributes, &self.attributes)
    }

    /// Ids linked in the snapshot but not linked anymore.
    pub fn unlinked_since_commit(&self) -> Vec<FragmentId> {
        self.canonical_relationships
            .values()
            .flatten()
            .filter(|id| !self.linked_fragment_ids().any(|linked| linked == *id))
            .cloned()
            .collect()
    }

    /// Accepts current state as synchronized.
    ///
    /// A committed deletion keeps `is_deleted` set but is no longer dirty;
    /// callers unload the owner afterwards.
    pub fn commit(&mut self) {
        self.canonical_attributes = self.attributes.clone();
        self.canonical_relationships = self.relationships.clone();
        self.canonical_deleted = self.is_deleted;
        self.is_new = false;
    }

    /// Discards local attribute and relationship edits.
    pub fn rollback(&mut self) {
        self.attributes = self.canonical_attributes.clone();
        self.relationships = self.canonical_relationships.clone();
        self.is_deleted = self.canonical_deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::{ParentAggregate, Relationships};
    use crate::model::fragment_id::encode;
    use crate::model::Attributes;
    use serde_json::json;

    fn person() -> ParentAggregate {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("John Doe"));
        let mut relationships = Relationships::new();
        relationships.insert(
            "addresses".to_string(),
            vec![
                encode("person", "1", "addresses", 0, None),
                encode("person", "1", "addresses", 1, None),
            ],
        );
        ParentAggregate::loaded("person", "1", attributes, relationships)
    }

    #[test]
    fn missing_relationship_reads_as_empty() {
        let parent = person();
        assert!(parent.relationship("phones").is_empty());
    }

    #[test]
    fn empty_relationship_equals_missing_snapshot_key() {
        let mut parent = person();
        parent.set_relationship("phones", Vec::new());
        assert!(!parent.relationships_changed());
        assert!(!parent.has_dirty_attributes());
    }

    #[test]
    fn unlinking_marks_parent_dirty_and_is_reported() {
        let mut parent = person();
        let removed = parent.relationship_mut("addresses").remove(0);
        assert!(parent.has_dirty_attributes());
        assert_eq!(parent.unlinked_since_commit(), vec![removed]);

        parent.rollback();
        assert!(!parent.has_dirty_attributes());
        assert_eq!(parent.relationship("addresses").len(), 2);
    }

    #[test]
    fn created_parent_is_dirty_until_commit() {
        let mut parent = ParentAggregate::created("person", "1", Attributes::new());
        assert!(parent.has_dirty_attributes());
        parent.commit();
        assert!(!parent.has_dirty_attributes());
    }

    #[test]
    fn committed_deletion_is_clean() {
        let mut parent = person();
        parent.mark_deleted();
        assert!(parent.has_dirty_attributes());

        parent.commit();
        assert!(parent.is_deleted());
        assert!(!parent.has_dirty_attributes());

        parent.rollback();
        assert!(parent.is_deleted());
    }
}
