//! Append-only command log.
//!
//! The log is a plain concatenation of RESP `SET` arrays with no header;
//! replaying it through the normal SET path reproduces the keyspace.
//! Appends go through a buffered writer; how often the buffer reaches
//! the OS is governed by the [`FsyncPolicy`].
//!
//! A rewrite compacts the log to one record per live key. While the
//! rewrite owns the file, in-flight appends are parked in an in-memory
//! buffer and spliced back afterwards, so no committed write is lost.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use kiln_core::Item;
use kiln_protocol::{parse_frame, Frame};
use tracing::warn;

use crate::error::PersistError;

/// When appended records are pushed from the writer's buffer to the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Flush after every append. Safest, slowest.
    Always,
    /// A once-per-second ticker flushes. Appends themselves don't.
    #[default]
    EverySec,
    /// Never flush explicitly; the OS writes back when it pleases.
    No,
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(FsyncPolicy::Always),
            "everysec" => Ok(FsyncPolicy::EverySec),
            "no" => Ok(FsyncPolicy::No),
            other => Err(format!("unknown appendfsync mode '{other}'")),
        }
    }
}

/// Where appends currently land.
enum Route {
    /// Straight to the log file.
    File(BufWriter<File>),
    /// Parked in memory while a rewrite owns the file.
    Parked(Vec<u8>),
}

/// The append-only log for mutating commands.
pub struct AofLog {
    path: PathBuf,
    fsync: FsyncPolicy,
    route: Mutex<Route>,
}

impl AofLog {
    /// Opens (or creates) the log file for appending.
    pub fn open(path: impl Into<PathBuf>, fsync: FsyncPolicy) -> Result<Self, PersistError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            fsync,
            route: Mutex::new(Route::File(BufWriter::new(file))),
        })
    }

    /// The configured sync discipline.
    pub fn fsync_policy(&self) -> FsyncPolicy {
        self.fsync
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one `SET key value` record.
    pub fn append_set(&self, key: &[u8], value: &[u8]) -> Result<(), PersistError> {
        let mut record = BytesMut::new();
        Frame::set_command(key, value).serialize(&mut record);

        let mut route = self.lock();
        match &mut *route {
            Route::File(w) => {
                w.write_all(&record)?;
                if self.fsync == FsyncPolicy::Always {
                    w.flush()?;
                }
            }
            Route::Parked(buf) => buf.extend_from_slice(&record),
        }
        Ok(())
    }

    /// Flushes buffered appends to the OS. Driven once per second by the
    /// `everysec` ticker; a no-op while a rewrite has appends parked.
    pub fn flush(&self) -> Result<(), PersistError> {
        if let Route::File(w) = &mut *self.lock() {
            w.flush()?;
        }
        Ok(())
    }

    /// Compacts the log to exactly one `SET` record per entry of
    /// `entries` (a detached snapshot of the keyspace).
    ///
    /// Appends arriving during the compaction are parked in memory and
    /// spliced to the file afterwards, whether or not the compaction
    /// itself succeeded; parked records are never dropped.
    pub fn rewrite(&self, entries: &HashMap<String, Item>) -> Result<(), PersistError> {
        // redirect in-flight appends to memory and take the file writer
        let mut writer = {
            let mut route = self.lock();
            match std::mem::replace(&mut *route, Route::Parked(Vec::new())) {
                Route::File(w) => w,
                Route::Parked(buf) => {
                    *route = Route::Parked(buf);
                    return Err(PersistError::RewriteInProgress);
                }
            }
        };

        let compacted = compact_into(&mut writer, entries);

        // re-point appends at the file and splice whatever got parked
        let mut route = self.lock();
        let parked = match std::mem::replace(&mut *route, Route::File(writer)) {
            Route::Parked(bytes) => bytes,
            Route::File(_) => Vec::new(),
        };
        let spliced = self.splice(&mut route, parked);
        compacted.and(spliced)
    }

    fn splice(&self, route: &mut Route, parked: Vec<u8>) -> Result<(), PersistError> {
        if parked.is_empty() {
            return Ok(());
        }
        if let Route::File(w) = route {
            w.write_all(&parked)?;
            if self.fsync == FsyncPolicy::Always {
                w.flush()?;
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Route> {
        self.route.lock().expect("aof route lock poisoned")
    }
}

/// Truncates the file and writes one `SET` record per snapshot entry.
fn compact_into(
    w: &mut BufWriter<File>,
    entries: &HashMap<String, Item>,
) -> Result<(), PersistError> {
    w.flush()?;
    w.get_ref().set_len(0)?;

    let mut buf = BytesMut::new();
    for (key, item) in entries {
        buf.clear();
        Frame::set_command(key.as_bytes(), &item.value).serialize(&mut buf);
        w.write_all(&buf)?;
    }
    w.flush()?;
    Ok(())
}

/// Replays the log at `path`, calling `apply` for each `SET` record in
/// order. Returns the number of records applied.
///
/// A missing file replays nothing. A malformed or truncated record stops
/// the replay with a warning; recovery is best-effort and never blocks
/// startup.
pub fn replay(path: &Path, mut apply: impl FnMut(&str, Bytes)) -> Result<u64, PersistError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut offset = 0;
    let mut applied = 0u64;
    while offset < data.len() {
        match parse_frame(&data[offset..]) {
            Ok(Some((frame, consumed))) => {
                offset += consumed;
                match as_set_record(frame) {
                    Some((key, value)) => {
                        apply(&key, value);
                        applied += 1;
                    }
                    None => {
                        warn!(offset, "aof replay: record is not a SET array, stopping");
                        break;
                    }
                }
            }
            Ok(None) => {
                warn!(offset, "aof replay: truncated trailing record, stopping");
                break;
            }
            Err(e) => {
                warn!(offset, error = %e, "aof replay: malformed record, stopping");
                break;
            }
        }
    }
    Ok(applied)
}

/// Interprets a frame as a `SET key value` array.
fn as_set_record(frame: Frame) -> Option<(String, Bytes)> {
    let items = match frame {
        Frame::Array(items) if items.len() == 3 => items,
        _ => return None,
    };
    let mut items = items.into_iter();
    match items.next() {
        Some(Frame::Bulk(name)) if name.eq_ignore_ascii_case(b"SET") => {}
        _ => return None,
    }
    let key = match items.next() {
        Some(Frame::Bulk(key)) => String::from_utf8(key.to_vec()).ok()?,
        _ => return None,
    };
    let value = match items.next() {
        Some(Frame::Bulk(value)) => value,
        _ => return None,
    };
    Some((key, value))
}
