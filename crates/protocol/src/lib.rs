//! Wire types for the uidrive automation protocol.
//!
//! This crate contains the serde-serializable shapes exchanged between the
//! automation server and its clients: contexts, orientation, log records,
//! locators, and the status descriptor.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization and small parsing helpers
//! - **Deterministic**: Maps are key-ordered so snapshots compare equal
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Session coordination and command routing live in `uidrive-core`.

pub mod status;
pub mod types;

pub use status::*;
pub use types::*;
