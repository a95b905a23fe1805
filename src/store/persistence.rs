//! On-disk snapshot of a published record store
//!
//! File format:
//! - 4 byte magic `PKDB`
//! - u32 format version (little endian)
//! - u32 crc32 of payload
//! - u64 payload length
//! - bincode payload (generation, build time, records)
//!
//! Writes go to `<path>.tmp`, are fsynced, then renamed over the target so a
//! crash never leaves a half-written snapshot behind.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::record_store::RecordStore;
use super::types::Generation;
use crate::error::{PkgDbError, Result};
use crate::models::PackageRecord;

/// Snapshot format version for compatibility checking
pub const SNAPSHOT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"PKDB";
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Serialize)]
struct SnapshotBodyRef<'a> {
    generation: Generation,
    built_at: u64,
    records: Vec<&'a PackageRecord>,
}

#[derive(Deserialize)]
struct SnapshotBody {
    generation: Generation,
    built_at: u64,
    records: Vec<PackageRecord>,
}

/// Serialize a store into the snapshot file format
pub fn encode_store(store: &RecordStore) -> Result<Vec<u8>> {
    let body = SnapshotBodyRef {
        generation: store.generation(),
        built_at: store.built_at(),
        records: store.iter().map(Arc::as_ref).collect(),
    };
    let payload = bincode::serialize(&body)?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let crc32 = hasher.finalize();

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Deserialize a store from the snapshot file format, validating checksum
pub fn decode_store(data: &[u8]) -> Result<RecordStore> {
    if data.len() < HEADER_LEN {
        return Err(PkgDbError::CorruptSnapshot(format!(
            "truncated header ({} bytes)",
            data.len()
        )));
    }
    if &data[0..4] != MAGIC {
        return Err(PkgDbError::CorruptSnapshot("bad magic".to_string()));
    }

    let version = u32::from_le_bytes(read_array(&data[4..8]));
    if version > SNAPSHOT_VERSION {
        return Err(PkgDbError::IncompatibleSnapshot {
            expected: SNAPSHOT_VERSION,
            actual: version,
        });
    }

    let stored_crc = u32::from_le_bytes(read_array(&data[8..12]));
    let len = u64::from_le_bytes(read_array(&data[12..20])) as usize;
    let payload = &data[HEADER_LEN..];
    if payload.len() != len {
        return Err(PkgDbError::CorruptSnapshot(format!(
            "payload length mismatch: expected {}, found {}",
            len,
            payload.len()
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(PkgDbError::CorruptSnapshot(
            "checksum mismatch".to_string(),
        ));
    }

    let body: SnapshotBody = bincode::deserialize(payload)?;
    // No later cycle could be numbered after this one
    if body.generation.next().is_none() {
        return Err(PkgDbError::CorruptSnapshot(format!(
            "generation {} leaves no room for a rebuild",
            body.generation
        )));
    }
    Ok(RecordStore::from_parts(
        body.generation,
        body.records,
        body.built_at,
    ))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// A snapshot file on disk
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically write `store` to disk. Returns the number of bytes written.
    pub fn save(&self, store: &RecordStore) -> Result<u64> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = encode_store(store)?;
        let tmp = self.tmp_path();
        let written = Self::write_tmp(&tmp, &data).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(data.len() as u64)
    }

    fn write_tmp(tmp: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(tmp)?;
        file.write_all(data)?;
        file.sync_all()
    }

    /// Load the snapshot, or `None` if no file exists yet
    pub fn load(&self) -> Result<Option<RecordStore>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        decode_store(&data).map(Some)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
