//! Point-in-time snapshot files.
//!
//! The snapshot is a self-describing binary encoding of the full mapping,
//! metadata included, so decode-after-encode reproduces the keyspace
//! bit-for-bit (expiry and access counters too).
//!
//! File layout:
//! ```text
//! [KRDB magic: 4B][version: 1B][entry_count: 4B]
//! [entries...]
//! ```
//!
//! Each entry:
//! ```text
//! [key_len: 4B][key][value_len: 4B][value]
//! [expires_at_ms: 8B][last_access_ms: 8B][accesses: 8B]
//! ```
//!
//! A save encodes to memory, hashes the buffer with SHA-256, writes and
//! fsyncs the file, then rewinds and hashes what actually hit the disk.
//! The two digests must agree or the save is reported failed.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use kiln_core::Item;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::PersistError;
use crate::format;

/// Magic bytes for the snapshot file header.
pub const RDB_MAGIC: &[u8; 4] = b"KRDB";

/// Current snapshot format version.
pub const RDB_VERSION: u8 = 1;

/// Encodes the mapping into a standalone snapshot buffer.
pub fn encode(entries: &HashMap<String, Item>) -> Result<Vec<u8>, PersistError> {
    let mut buf = Vec::new();
    format::write_header(&mut buf, RDB_MAGIC, RDB_VERSION)?;

    let count = u32::try_from(entries.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("entry count {} exceeds u32::MAX", entries.len()),
        )
    })?;
    format::write_u32(&mut buf, count)?;

    for (key, item) in entries {
        format::write_bytes(&mut buf, key.as_bytes())?;
        format::write_bytes(&mut buf, &item.value)?;
        format::write_u64(&mut buf, item.expires_at_ms)?;
        format::write_u64(&mut buf, item.last_access_ms())?;
        format::write_u64(&mut buf, item.accesses())?;
    }
    Ok(buf)
}

/// Decodes a snapshot buffer back into the mapping it was encoded from.
pub fn decode(data: &[u8]) -> Result<HashMap<String, Item>, PersistError> {
    let mut cursor = Cursor::new(data);
    format::read_header(&mut cursor, RDB_MAGIC, RDB_VERSION)?;

    let count = format::read_u32(&mut cursor)?;
    let mut entries = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key_bytes = format::read_bytes(&mut cursor)?;
        let key = String::from_utf8(key_bytes)
            .map_err(|_| PersistError::InvalidData("key is not valid utf-8".into()))?;
        let value = Bytes::from(format::read_bytes(&mut cursor)?);
        let expires_at_ms = format::read_u64(&mut cursor)?;
        let last_access_ms = format::read_u64(&mut cursor)?;
        let accesses = format::read_u64(&mut cursor)?;
        entries.insert(
            key,
            Item::from_parts(value, expires_at_ms, last_access_ms, accesses),
        );
    }
    Ok(entries)
}

/// Saves the mapping to `path` with a verified checksum.
///
/// The file is opened with create+truncate, the encoded buffer is
/// written and fsynced, then the file is rewound and re-hashed; a digest
/// mismatch aborts the save with [`PersistError::ChecksumMismatch`].
pub fn save(path: &Path, entries: &HashMap<String, Item>) -> Result<(), PersistError> {
    let buf = encode(entries)?;
    let buffer_sum = Sha256::digest(&buf);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;

    file.seek(SeekFrom::Start(0))?;
    let file_sum = hash_reader(&mut file)?;

    if buffer_sum[..] != file_sum[..] {
        return Err(PersistError::ChecksumMismatch);
    }

    debug!(path = %path.display(), entries = entries.len(), "snapshot saved");
    Ok(())
}

/// Loads a snapshot from `path`. A missing file yields `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<HashMap<String, Item>>, PersistError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    decode(&data).map(Some)
}

/// SHA-256 of everything a reader yields.
fn hash_reader(r: &mut impl Read) -> Result<sha2::digest::Output<Sha256>, PersistError> {
    let mut hasher = Sha256::new();
    io::copy(r, &mut hasher)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use kiln_core::NO_EXPIRY;

    use super::*;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn sample_entries() -> HashMap<String, Item> {
        let mut entries = HashMap::new();
        entries.insert(
            "plain".to_owned(),
            Item::from_parts(Bytes::from_static(b"value"), NO_EXPIRY, 1_000, 3),
        );
        entries.insert(
            "expiring".to_owned(),
            Item::from_parts(Bytes::from_static(b"soon"), 99_999, 2_000, 0),
        );
        entries.insert(
            "binary".to_owned(),
            Item::from_parts(Bytes::from_static(b"\x00\x01\xff"), NO_EXPIRY, 0, 0),
        );
        entries
    }

    #[test]
    fn encode_decode_round_trip() {
        let entries = sample_entries();
        let buf = encode(&entries).unwrap();
        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_mapping_round_trips() {
        let entries = HashMap::new();
        let decoded = decode(&encode(&entries).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = temp_dir();
        let path = dir.path().join("dump.rdb");

        let entries = sample_entries();
        save(&path, &entries).unwrap();

        let loaded = load(&path).unwrap().expect("snapshot should exist");
        assert_eq!(loaded, entries);
    }

    #[test]
    fn save_truncates_previous_snapshot() {
        let dir = temp_dir();
        let path = dir.path().join("dump.rdb");

        save(&path, &sample_entries()).unwrap();

        let mut smaller = HashMap::new();
        smaller.insert("only".to_owned(), Item::new(Bytes::from_static(b"one")));
        save(&path, &smaller).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("only"));
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = temp_dir();
        assert!(load(&dir.path().join("absent.rdb")).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let err = decode(b"NOPE\x01\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PersistError::InvalidMagic));
    }

    #[test]
    fn decode_rejects_truncated_entry() {
        let entries = sample_entries();
        let buf = encode(&entries).unwrap();
        let err = decode(&buf[..buf.len() - 4]).unwrap_err();
        assert!(matches!(err, PersistError::UnexpectedEof));
    }

    #[test]
    fn buffer_and_file_digests_agree_after_save() {
        let dir = temp_dir();
        let path = dir.path().join("dump.rdb");

        let entries = sample_entries();
        save(&path, &entries).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(
            Sha256::digest(&on_disk)[..],
            Sha256::digest(&encode(&entries).unwrap())[..],
        );
    }
}
