//! Record store abstractions.
//!
//! # Responsibility
//! - Define the host store contract used by the fragment transforms.
//! - Keep identity-map details out of normalize/serialize orchestration.
//!
//! # Invariants
//! - Store APIs return semantic errors (`ParentNotFound`, `FragmentNotFound`,
//!   `DuplicateFragment`) instead of panicking on missing records.

pub mod record_store;
