//! File-backed snapshot persistence.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json              - metadata and schema version
//! snapshots/
//!   000001.snapshot.zst        - zstd compressed object streams
//! integrity/
//!   manifest.json              - hash chain manifest
//! ```

use crate::error::PersistError;
use crate::snapshot::{Snapshot, sha256_hex};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Version of the on-disk layout and record format.
const STORE_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const SNAPSHOT_DIR: &str = "snapshots";
const INTEGRITY_DIR: &str = "integrity";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    pub snapshot_count: u32,
}

/// One snapshot file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    /// SHA-256 of the compressed file.
    pub sha256: String,
    pub prev_hash: Option<String>,
    pub object_count: usize,
}

/// Hash chain over every snapshot file, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Directory of compressed snapshots with schema versioning and integrity
/// checking.
pub struct SnapshotStore {
    root: PathBuf,
    compression_level: i32,
    meta: StoreMeta,
    manifest: IntegrityManifest,
}

impl SnapshotStore {
    /// Open the store at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>, compression_level: i32) -> Result<Self, PersistError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(SNAPSHOT_DIR))?;
        std::fs::create_dir_all(root.join(INTEGRITY_DIR))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join(INTEGRITY_DIR).join(MANIFEST_FILE);

        let (meta, manifest) = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(PersistError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = StoreMeta {
                schema_version: STORE_SCHEMA_VERSION,
                snapshot_count: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            tracing::info!(root = %root.display(), "created snapshot store");
            (meta, manifest)
        };

        Ok(Self {
            root,
            compression_level,
            meta,
            manifest,
        })
    }

    /// Compress and append `snapshot`. Returns its 1-based index.
    pub fn save(&mut self, snapshot: &Snapshot) -> Result<u32, PersistError> {
        let index = self.meta.snapshot_count + 1;
        let filename = snapshot_filename(index);
        let compressed = zstd_compress(&snapshot.bytes, self.compression_level)?;
        let hash = sha256_hex(&compressed);
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(self.root.join(SNAPSHOT_DIR).join(&filename), &compressed)?;

        self.meta.snapshot_count = index;
        self.manifest.entries.push(ManifestEntry {
            filename,
            sha256: hash,
            prev_hash,
            object_count: snapshot.object_count,
        });
        self.save_meta()?;
        self.save_manifest()?;
        tracing::info!(
            index,
            objects = snapshot.object_count,
            raw = snapshot.bytes.len(),
            compressed = compressed.len(),
            "saved snapshot"
        );
        Ok(index)
    }

    /// Load snapshot `index` (1-based), checking it against the manifest.
    pub fn load(&self, index: u32) -> Result<Snapshot, PersistError> {
        let entry = index
            .checked_sub(1)
            .and_then(|i| self.manifest.entries.get(i as usize))
            .ok_or(PersistError::SnapshotNotFound(index))?;
        let compressed = std::fs::read(self.root.join(SNAPSHOT_DIR).join(&entry.filename))?;
        let actual = sha256_hex(&compressed);
        if actual != entry.sha256 {
            return Err(PersistError::IntegrityMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }
        let bytes = zstd_decompress(&compressed)?;
        tracing::debug!(index, objects = entry.object_count, "loaded snapshot");
        Ok(Snapshot::from_bytes(bytes, entry.object_count))
    }

    pub fn load_latest(&self) -> Result<Snapshot, PersistError> {
        if self.meta.snapshot_count == 0 {
            return Err(PersistError::NoSnapshots);
        }
        self.load(self.meta.snapshot_count)
    }

    /// Verify every file hash and the chain linking them.
    pub fn verify_integrity(&self) -> Result<(), PersistError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(PersistError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            let data = std::fs::read(self.root.join(SNAPSHOT_DIR).join(&entry.filename))?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(PersistError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    pub fn manifest(&self) -> &IntegrityManifest {
        &self.manifest
    }

    fn save_meta(&self) -> Result<(), PersistError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), PersistError> {
        let path = self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

fn snapshot_filename(index: u32) -> String {
    format!("{index:06}.snapshot.zst")
}

fn zstd_compress(data: &[u8], level: i32) -> Result<Vec<u8>, PersistError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}
