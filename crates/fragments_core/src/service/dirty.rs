//! Owner dirtiness including embedded fragments.
//!
//! An owner is dirty when its own state changed or when any fragment linked
//! through its relationships is dirty. Fragment edits do not notify the owner,
//! so the answer is recomputed on every call.

use crate::model::fragment_id::FragmentId;
use crate::model::parent::ParentAggregate;
use crate::repo::record_store::RecordStore;
use log::debug;

/// Returns whether the owner or any linked fragment differs from its snapshot.
pub fn is_dirty<S: RecordStore + ?Sized>(parent: &ParentAggregate, store: &S) -> bool {
    if parent.has_dirty_attributes() {
        return true;
    }
    parent.linked_fragment_ids().any(|id| fragment_is_dirty(store, id))
}

/// Linked fragment ids that are dirty, in relationship order.
pub fn dirty_fragments<S: RecordStore + ?Sized>(
    parent: &ParentAggregate,
    store: &S,
) -> Vec<FragmentId> {
    parent
        .linked_fragment_ids()
        .filter(|id| fragment_is_dirty(store, id))
        .cloned()
        .collect()
}

fn fragment_is_dirty<S: RecordStore + ?Sized>(store: &S, id: &FragmentId) -> bool {
    match store.peek_fragment(id) {
        Some(fragment) => fragment.is_dirty(),
        None => {
            debug!(
                "event=dirty_check module=service status=skip reason=fragment_not_loaded id={id}"
            );
            false
        }
    }
}
