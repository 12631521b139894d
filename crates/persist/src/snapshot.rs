use crate::error::PersistError;
use ember_common::{ByteReader, ByteWriter};
use ember_kernel::{Handle, ObjectManager};
use sha2::{Digest, Sha256};

/// A content-addressed capture of every live object in a manager.
///
/// `bytes` is exactly what [`ObjectManager::serialize`] produced; restoring
/// it into any manager with the same classes registered rebuilds an
/// equivalent population under new instance ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub object_count: usize,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, lowercase hex.
    pub digest: String,
}

impl Snapshot {
    pub fn capture(manager: &ObjectManager) -> Result<Self, PersistError> {
        let mut out = ByteWriter::new();
        let object_count = manager.serialize(&mut out)?;
        Ok(Self::from_bytes(out.into_bytes(), object_count))
    }

    pub fn from_bytes(bytes: Vec<u8>, object_count: usize) -> Self {
        let digest = sha256_hex(&bytes);
        Self {
            object_count,
            bytes,
            digest,
        }
    }

    /// Recompute the digest and compare it with the stored one.
    pub fn verify(&self) -> bool {
        sha256_hex(&self.bytes) == self.digest
    }

    /// Rebuild the captured objects in `manager`.
    ///
    /// Returns owning handles to the new objects in stream order. Fails
    /// before touching the manager if the snapshot does not verify.
    pub fn restore(&self, manager: &ObjectManager) -> Result<Vec<Handle>, PersistError> {
        if !self.verify() {
            return Err(PersistError::IntegrityMismatch {
                expected: self.digest.clone(),
                actual: sha256_hex(&self.bytes),
            });
        }
        let objects = manager.deserialize(&mut ByteReader::new(&self.bytes))?;
        tracing::debug!(objects = objects.len(), digest = %self.digest, "restored snapshot");
        Ok(objects)
    }
}

/// Ordered in-memory list of snapshots, for rollback within a session.
#[derive(Debug, Default)]
pub struct SnapshotHistory {
    snapshots: Vec<Snapshot>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `manager` and append the snapshot. Returns its index.
    pub fn take_snapshot(&mut self, manager: &ObjectManager) -> Result<usize, PersistError> {
        self.snapshots.push(Snapshot::capture(manager)?);
        Ok(self.snapshots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Restore snapshot `index` into `manager`.
    pub fn rollback(
        &self,
        index: usize,
        manager: &ObjectManager,
    ) -> Result<Vec<Handle>, PersistError> {
        let snapshot = self
            .snapshots
            .get(index)
            .ok_or(PersistError::SnapshotNotFound(index as u32))?;
        snapshot.restore(manager)
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
