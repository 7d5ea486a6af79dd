//! Record model for owners and their embedded fragments.
//!
//! # Responsibility
//! - Define the identifier scheme for positional child records.
//! - Define owner and fragment records with snapshot-based change tracking.
//!
//! # Invariants
//! - Fragment ids are derived once from owner, key and creation position.
//! - Owner attributes and fragment relationships are separate fields.

pub mod fragment;
pub mod fragment_id;
pub mod parent;

/// Plain JSON attribute map shared by owners and fragments.
pub type Attributes = serde_json::Map<String, serde_json::Value>;
