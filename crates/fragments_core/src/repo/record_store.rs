//! Host record store contract and in-memory identity map.
//!
//! # Responsibility
//! - Define the store capabilities the fragment transforms rely on.
//! - Provide an in-memory implementation keyed by owner key and fragment id.
//!
//! # Invariants
//! - One record per key: owners by `(model_type, id)`, fragments by id.
//! - `create_fragment` never overwrites; `push_fragment` always replaces.

use crate::model::fragment::ChildFragment;
use crate::model::fragment_id::FragmentId;
use crate::model::parent::ParentAggregate;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store lookup and registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {model_type}/{id}")]
    ParentNotFound { model_type: String, id: String },
    #[error("fragment not found: {0}")]
    FragmentNotFound(FragmentId),
    #[error("fragment id already registered: {0}")]
    DuplicateFragment(FragmentId),
}

/// Identity key of one owner record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParentKey {
    pub model_type: String,
    pub id: String,
}

impl ParentKey {
    pub fn new(model_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            id: id.into(),
        }
    }

    pub fn of(parent: &ParentAggregate) -> Self {
        Self::new(parent.model_type.as_str(), parent.id())
    }
}

/// Capabilities consumed from the host entity store.
pub trait RecordStore {
    /// Inserts or replaces one owner record.
    fn push_parent(&mut self, parent: ParentAggregate);
    /// Inserts or replaces one fragment record.
    fn push_fragment(&mut self, fragment: ChildFragment);
    /// Registers a fragment pending creation; fails when the id is taken.
    fn create_fragment(&mut self, fragment: ChildFragment) -> StoreResult<()>;
    fn peek_parent(&self, key: &ParentKey) -> Option<&ParentAggregate>;
    fn peek_parent_mut(&mut self, key: &ParentKey) -> Option<&mut ParentAggregate>;
    fn peek_fragment(&self, id: &FragmentId) -> Option<&ChildFragment>;
    fn peek_fragment_mut(&mut self, id: &FragmentId) -> Option<&mut ChildFragment>;
    /// Drops one fragment from the identity map.
    fn unload_fragment(&mut self, id: &FragmentId) -> Option<ChildFragment>;
    /// Drops one owner record from the identity map.
    fn unload_parent(&mut self, key: &ParentKey) -> Option<ParentAggregate>;

    /// Like [`RecordStore::peek_parent`] but reports absence as an error.
    fn parent(&self, key: &ParentKey) -> StoreResult<&ParentAggregate> {
        self.peek_parent(key).ok_or_else(|| StoreError::ParentNotFound {
            model_type: key.model_type.clone(),
            id: key.id.clone(),
        })
    }

    /// Like [`RecordStore::peek_parent_mut`] but reports absence as an error.
    fn parent_mut(&mut self, key: &ParentKey) -> StoreResult<&mut ParentAggregate> {
        let (model_type, id) = (key.model_type.clone(), key.id.clone());
        self.peek_parent_mut(key)
            .ok_or(StoreError::ParentNotFound { model_type, id })
    }

    /// Like [`RecordStore::peek_fragment`] but reports absence as an error.
    fn fragment(&self, id: &FragmentId) -> StoreResult<&ChildFragment> {
        self.peek_fragment(id)
            .ok_or_else(|| StoreError::FragmentNotFound(id.clone()))
    }

    /// Like [`RecordStore::peek_fragment_mut`] but reports absence as an error.
    fn fragment_mut(&mut self, id: &FragmentId) -> StoreResult<&mut ChildFragment> {
        let missing = StoreError::FragmentNotFound(id.clone());
        self.peek_fragment_mut(id).ok_or(missing)
    }
}

/// In-memory identity map.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    parents: BTreeMap<ParentKey, ParentAggregate>,
    fragments: HashMap<FragmentId, ChildFragment>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Loaded fragments that are pending deletion, sorted by id.
    pub fn deleted_fragments(&self) -> Vec<&ChildFragment> {
        let mut deleted: Vec<&ChildFragment> = self
            .fragments
            .values()
            .filter(|fragment| fragment.is_deleted())
            .collect();
        deleted.sort_by(|a, b| a.id().cmp(b.id()));
        deleted
    }
}

impl RecordStore for MemoryRecordStore {
    fn push_parent(&mut self, parent: ParentAggregate) {
        let key = ParentKey::of(&parent);
        debug!(
            "event=store_push module=repo status=ok kind=parent model_type={} replaced={}",
            key.model_type,
            self.parents.contains_key(&key)
        );
        self.parents.insert(key, parent);
    }

    fn push_fragment(&mut self, fragment: ChildFragment) {
        self.fragments.insert(fragment.id().clone(), fragment);
    }

    fn create_fragment(&mut self, fragment: ChildFragment) -> StoreResult<()> {
        if self.fragments.contains_key(fragment.id()) {
            return Err(StoreError::DuplicateFragment(fragment.id().clone()));
        }
        self.fragments.insert(fragment.id().clone(), fragment);
        Ok(())
    }

    fn peek_parent(&self, key: &ParentKey) -> Option<&ParentAggregate> {
        self.parents.get(key)
    }

    fn peek_parent_mut(&mut self, key: &ParentKey) -> Option<&mut ParentAggregate> {
        self.parents.get_mut(key)
    }

    fn peek_fragment(&self, id: &FragmentId) -> Option<&ChildFragment> {
        self.fragments.get(id)
    }

    fn peek_fragment_mut(&mut self, id: &FragmentId) -> Option<&mut ChildFragment> {
        self.fragments.get_mut(id)
    }

    fn unload_fragment(&mut self, id: &FragmentId) -> Option<ChildFragment> {
        self.fragments.remove(id)
    }

    fn unload_parent(&mut self, key: &ParentKey) -> Option<ParentAggregate> {
        self.parents.remove(key)
    }
}
