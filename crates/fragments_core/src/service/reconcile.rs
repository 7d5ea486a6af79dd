//! Sibling position reconciliation.
//!
//! # Responsibility
//! - Renumber fragment positions after removal, append or move.
//!
//! # Invariants
//! - After a pass, linked siblings hold positions `0..n-1` in relationship
//!   order.
//! - Fragment ids are never re-encoded here, so an id's position segment may
//!   diverge from the live `position` after a removal or move.

use crate::model::fragment_id::FragmentId;
use crate::repo::record_store::{ParentKey, RecordStore};
use crate::service::{TransformError, TransformResult};
use log::debug;

/// Assigns `position = index` along `ids`.
///
/// Returns how many fragments changed position.
pub fn reconcile_positions<S: RecordStore + ?Sized>(
    store: &mut S,
    ids: &[FragmentId],
) -> TransformResult<usize> {
    let mut changed = 0;
    for (index, id) in ids.iter().enumerate() {
        let fragment = store.fragment_mut(id)?;
        if fragment.position() != index {
            fragment.set_position(index);
            changed += 1;
        }
    }
    Ok(changed)
}

/// Reconciles the current relationship of `key` on one owner.
pub fn reconcile_relationship<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_key: &ParentKey,
    key: &str,
) -> TransformResult<usize> {
    let ids = store.parent(parent_key)?.relationship(key).to_vec();
    let changed = reconcile_positions(store, &ids)?;
    debug!(
        "event=reconcile module=service status=ok model_type={} key={} siblings={} changed={}",
        parent_key.model_type,
        key,
        ids.len(),
        changed
    );
    Ok(changed)
}

/// Removes one fragment and closes the gap it leaves.
///
/// A committed fragment is marked deleted and stays in the store, so its id
/// and data remain available for the deletion request. A fragment created
/// since the last commit has nothing to delete remotely and is unloaded.
///
/// # Errors
/// - `FragmentNotLinked` when `id` is not in the relationship.
pub fn remove_fragment<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_key: &ParentKey,
    key: &str,
    id: &FragmentId,
) -> TransformResult<()> {
    let index = store
        .parent(parent_key)?
        .relationship(key)
        .iter()
        .position(|linked| linked == id)
        .ok_or_else(|| TransformError::FragmentNotLinked {
            key: key.to_string(),
            id: id.clone(),
        })?;

    let fragment = store.fragment_mut(id)?;
    let is_new = fragment.is_new();
    fragment.mark_deleted();
    store.parent_mut(parent_key)?.relationship_mut(key).remove(index);
    if is_new {
        store.unload_fragment(id);
    }
    reconcile_relationship(store, parent_key, key)?;
    Ok(())
}

/// Moves the fragment at `from` to index `to` within one relationship.
///
/// # Errors
/// - `IndexOutOfRange` when either index is past the end.
pub fn move_fragment<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_key: &ParentKey,
    key: &str,
    from: usize,
    to: usize,
) -> TransformResult<()> {
    let siblings = store.parent_mut(parent_key)?.relationship_mut(key);
    let len = siblings.len();
    for index in [from, to] {
        if index >= len {
            return Err(TransformError::IndexOutOfRange {
                key: key.to_string(),
                index,
                len,
            });
        }
    }

    let moved = siblings.remove(from);
    siblings.insert(to, moved);
    reconcile_relationship(store, parent_key, key)?;
    Ok(())
}

/// Links an already registered fragment at the end of a relationship.
pub fn link_fragment<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_key: &ParentKey,
    key: &str,
    id: FragmentId,
) -> TransformResult<()> {
    store.parent_mut(parent_key)?.relationship_mut(key).push(id);
    reconcile_relationship(store, parent_key, key)?;
    Ok(())
}
