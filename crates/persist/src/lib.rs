//! Persistence of object populations.
//!
//! A snapshot is the manager's serialized byte stream plus a SHA-256 digest.
//! Snapshots can be kept in memory ([`SnapshotHistory`]) or written to a
//! directory as zstd-compressed files chained by an integrity manifest
//! ([`SnapshotStore`]).
//!
//! # Invariants
//! - Snapshots are content-addressed and verified before they are restored.
//! - The store fails closed on schema or hash mismatch.

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::PersistError;
pub use snapshot::{Snapshot, SnapshotHistory};
pub use store::{IntegrityManifest, ManifestEntry, SnapshotStore, StoreMeta};
