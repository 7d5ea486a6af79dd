//! Fragment use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for loading, editing and saving owners with
//!   embedded fragment collections.
//! - Delegate identity-map work to a `RecordStore` implementation.
//!
//! # Invariants
//! - The id codec is supplied at construction; nothing else mints ids.
//! - Every relationship mutation ends with a reconciliation pass.
//! - Dirty answers are never cached.

use crate::model::fragment::{ChildFragment, FragmentMeta};
use crate::model::fragment_id::{ColonCodec, FragmentId, FragmentIdCodec};
use crate::model::parent::ParentAggregate;
use crate::model::Attributes;
use crate::repo::record_store::{ParentKey, RecordStore};
use crate::schema::{EmbeddedCollection, Schema};
use crate::service::dirty;
use crate::service::normalize::{
    pick_attributes, validate_owner_id, variant_of, NormalizedDocument, Normalizer,
};
use crate::service::reconcile;
use crate::service::serialize::{serialize_record, SerializeOptions};
use crate::service::{TransformError, TransformResult};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Service facade over a record store, a schema and an id codec.
pub struct FragmentService<S: RecordStore, C: FragmentIdCodec = ColonCodec> {
    store: S,
    schema: Schema,
    codec: C,
}

impl<S: RecordStore> FragmentService<S, ColonCodec> {
    /// Creates a service with the default `:`-joined id codec.
    pub fn new(store: S, schema: Schema) -> TransformResult<Self> {
        Self::with_codec(store, schema, ColonCodec)
    }
}

impl<S: RecordStore, C: FragmentIdCodec> FragmentService<S, C> {
    /// Creates a service with a caller-provided id codec.
    ///
    /// # Errors
    /// - `Schema(..)` when the schema fails validation.
    pub fn with_codec(store: S, schema: Schema, codec: C) -> TransformResult<Self> {
        schema.validate()?;
        Ok(Self {
            store,
            schema,
            codec,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Normalizes a payload without touching the store.
    pub fn normalize(
        &self,
        model_type: &str,
        payload: &Value,
        fallback_id: Option<&str>,
    ) -> TransformResult<NormalizedDocument> {
        Normalizer::new(&self.schema, &self.codec).normalize(model_type, payload, fallback_id)
    }

    /// Normalizes a payload and pushes owner and fragments into the store.
    pub fn normalize_response(
        &mut self,
        model_type: &str,
        payload: &Value,
        fallback_id: Option<&str>,
    ) -> TransformResult<NormalizedDocument> {
        let document = self.normalize(model_type, payload, fallback_id)?;
        self.push(document.clone());
        Ok(document)
    }

    /// Pushes a normalized document, replacing any loaded copy.
    ///
    /// Fragments of the previous copy that the document no longer links are
    /// unloaded.
    pub fn push(&mut self, document: NormalizedDocument) -> ParentKey {
        let key = ParentKey::of(&document.parent);
        let incoming: BTreeSet<&FragmentId> = document.parent.linked_fragment_ids().collect();

        let stale: Vec<FragmentId> = match self.store.peek_parent(&key) {
            Some(previous) => previous
                .linked_fragment_ids()
                .chain(previous.unlinked_since_commit().iter())
                .filter(|id| !incoming.contains(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        for id in &stale {
            self.store.unload_fragment(id);
        }

        let fragment_count = document.fragments.len();
        for fragment in document.fragments {
            self.store.push_fragment(fragment);
        }
        self.store.push_parent(document.parent);

        info!(
            "event=push module=service status=ok model_type={} fragments={} unloaded={}",
            key.model_type,
            fragment_count,
            stale.len()
        );
        key
    }

    /// Creates an owner pending creation.
    ///
    /// A v4 UUID is minted when `id` is `None`.
    pub fn create_parent(
        &mut self,
        model_type: &str,
        id: Option<&str>,
        attributes: Attributes,
    ) -> TransformResult<ParentKey> {
        let model = self.schema.model(model_type)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        validate_owner_id(&id)?;

        let mut parent = ParentAggregate::created(model_type, id, attributes);
        for collection in &model.embedded {
            parent.set_relationship(collection.key.as_str(), Vec::new());
        }

        let key = ParentKey::of(&parent);
        self.store.push_parent(parent);
        Ok(key)
    }

    /// Appends a new fragment at `position = current child count`.
    ///
    /// # Errors
    /// - `UnknownCollection` when `key` is not declared for the owner model.
    /// - `Store(DuplicateFragment)` when the encoded id is already held, e.g.
    ///   by a sibling whose position moved after a removal.
    pub fn append_fragment(
        &mut self,
        parent_key: &ParentKey,
        key: &str,
        attributes: Attributes,
    ) -> TransformResult<FragmentId> {
        let collection = self.collection(&parent_key.model_type, key)?.clone();
        let position = self.store.parent(parent_key)?.relationship(key).len();
        let variant_type = variant_of(Some(&attributes), &collection)?;
        let id = self.codec.encode(
            &parent_key.model_type,
            &parent_key.id,
            key,
            position,
            variant_type.as_deref(),
        );

        let fragment = ChildFragment::created(
            id.clone(),
            collection.fragment_type.as_str(),
            FragmentMeta {
                position,
                owner_type: parent_key.model_type.clone(),
                owner_id: parent_key.id.clone(),
                key: key.to_string(),
                variant_type,
            },
            pick_attributes(&attributes, &collection),
        );
        self.store.create_fragment(fragment)?;
        if let Err(err) = reconcile::link_fragment(&mut self.store, parent_key, key, id.clone()) {
            if let Ok(parent) = self.store.parent_mut(parent_key) {
                parent.relationship_mut(key).retain(|linked| linked != &id);
            }
            self.store.unload_fragment(&id);
            warn!(
                "event=fragment_append module=service status=error model_type={} key={} \
                 position={}",
                parent_key.model_type, key, position
            );
            return Err(err);
        }

        info!(
            "event=fragment_append module=service status=ok model_type={} key={} position={}",
            parent_key.model_type, key, position
        );
        Ok(id)
    }

    /// Marks a fragment deleted, unlinks it and renumbers its siblings.
    pub fn remove_fragment(
        &mut self,
        parent_key: &ParentKey,
        key: &str,
        id: &FragmentId,
    ) -> TransformResult<()> {
        self.collection(&parent_key.model_type, key)?;
        reconcile::remove_fragment(&mut self.store, parent_key, key, id)?;
        info!(
            "event=fragment_remove module=service status=ok model_type={} key={}",
            parent_key.model_type, key
        );
        Ok(())
    }

    /// Moves the fragment at index `from` to index `to` and renumbers.
    pub fn move_fragment(
        &mut self,
        parent_key: &ParentKey,
        key: &str,
        from: usize,
        to: usize,
    ) -> TransformResult<()> {
        self.collection(&parent_key.model_type, key)?;
        reconcile::move_fragment(&mut self.store, parent_key, key, from, to)
    }

    /// Linked fragments of one collection sorted by position.
    pub fn sorted_fragments(
        &self,
        parent_key: &ParentKey,
        key: &str,
    ) -> TransformResult<Vec<&ChildFragment>> {
        let mut fragments = self
            .store
            .parent(parent_key)?
            .relationship(key)
            .iter()
            .map(|id| self.store.fragment(id))
            .collect::<Result<Vec<_>, _>>()?;
        fragments.sort_by_key(|fragment| fragment.position());
        Ok(fragments)
    }

    /// Serializes one owner back into its nested wire shape.
    pub fn serialize(
        &self,
        parent_key: &ParentKey,
        options: SerializeOptions,
    ) -> TransformResult<Value> {
        let model = self.schema.model(&parent_key.model_type)?;
        let parent = self.store.parent(parent_key)?;
        serialize_record(model, parent, &self.store, options)
    }

    /// Returns whether the owner or any linked fragment is dirty.
    pub fn is_dirty(&self, parent_key: &ParentKey) -> TransformResult<bool> {
        let parent = self.store.parent(parent_key)?;
        Ok(dirty::is_dirty(parent, &self.store))
    }

    /// Linked fragment ids that are dirty.
    pub fn dirty_fragments(&self, parent_key: &ParentKey) -> TransformResult<Vec<FragmentId>> {
        let parent = self.store.parent(parent_key)?;
        Ok(dirty::dirty_fragments(parent, &self.store))
    }

    /// Accepts the owner and its fragments as synchronized.
    ///
    /// Fragments removed since the last commit are unloaded, and linked
    /// fragments pending deletion are unlinked and unloaded. An owner marked
    /// deleted is unloaded together with every fragment it references.
    pub fn commit(&mut self, parent_key: &ParentKey) -> TransformResult<()> {
        let parent = self.store.parent(parent_key)?;
        if parent.is_deleted() {
            self.unload_owner(parent_key);
            return Ok(());
        }
        let removed = parent.unlinked_since_commit();
        let relationships = parent.relationships().clone();

        for id in &removed {
            self.store.unload_fragment(id);
        }

        let mut unloaded = removed.len();
        for (key, ids) in relationships {
            let mut kept = Vec::with_capacity(ids.len());
            for id in ids {
                if self.store.fragment(&id)?.is_deleted() {
                    self.store.unload_fragment(&id);
                    unloaded += 1;
                } else {
                    kept.push(id);
                }
            }
            reconcile::reconcile_positions(&mut self.store, &kept)?;
            for id in &kept {
                self.store.fragment_mut(id)?.commit();
            }
            self.store.parent_mut(parent_key)?.set_relationship(key, kept);
        }

        self.store.parent_mut(parent_key)?.commit();
        info!(
            "event=commit module=service status=ok model_type={} unloaded={}",
            parent_key.model_type, unloaded
        );
        Ok(())
    }

    /// Discards local edits on the owner and its fragments.
    ///
    /// Fragments appended since the last commit are unloaded; removed ones
    /// are relinked and undeleted.
    pub fn rollback(&mut self, parent_key: &ParentKey) -> TransformResult<()> {
        let linked_before: Vec<FragmentId> = self
            .store
            .parent(parent_key)?
            .linked_fragment_ids()
            .cloned()
            .collect();

        let parent = self.store.parent_mut(parent_key)?;
        parent.rollback();
        let restored: BTreeSet<FragmentId> = parent.linked_fragment_ids().cloned().collect();

        for id in linked_before.iter().filter(|id| !restored.contains(*id)) {
            let is_new = self.store.peek_fragment(id).is_some_and(ChildFragment::is_new);
            if is_new {
                self.store.unload_fragment(id);
            }
        }
        for id in &restored {
            if let Some(fragment) = self.store.peek_fragment_mut(id) {
                fragment.rollback();
            }
        }
        Ok(())
    }

    fn unload_owner(&mut self, parent_key: &ParentKey) {
        let Some(parent) = self.store.unload_parent(parent_key) else {
            return;
        };
        let fragments: Vec<FragmentId> = parent
            .linked_fragment_ids()
            .cloned()
            .chain(parent.unlinked_since_commit())
            .collect();
        for id in &fragments {
            self.store.unload_fragment(id);
        }
        info!(
            "event=commit module=service status=ok model_type={} deleted=true unloaded={}",
            parent_key.model_type,
            fragments.len()
        );
    }

    fn collection(&self, model_type: &str, key: &str) -> TransformResult<&EmbeddedCollection> {
        self.schema
            .model(model_type)?
            .collection(key)
            .ok_or_else(|| TransformError::UnknownCollection {
                model_type: model_type.to_string(),
                key: key.to_string(),
            })
    }
}
