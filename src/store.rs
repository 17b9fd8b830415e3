//! Block-packed file store: a content file plus a
//! separately persisted entry table, first-fit placement, and
//! independent streaming retrieval.

use std::convert::TryInto;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::stream::RetrieveStream;
use crate::types::ObjectId;
use crate::util::{self, Cursor};

const INDEX_FILE: &str = "documents.dbx";
const CONTENT_FILE: &str = "contents.dbx";
const LOCK_FILE: &str = "store.lock";

/// One record in the entry table. `Ord` is by `offset` (needed by the
/// first-fit scan); `PartialEq`/`Eq` is by `id` (needed by
/// replace-on-`store`). Do not rely on set semantics keyed by offset.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub(crate) id: ObjectId,
    pub(crate) offset: u64,
    pub(crate) length: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.offset.cmp(&other.offset)
    }
}

impl Entry {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        util::write_u32(buf, self.id.0);
        util::write_u32(buf, self.offset.try_into().map_err(|_| overflow())?);
        util::write_u32(buf, self.length.try_into().map_err(|_| overflow())?);
        Ok(())
    }

    fn decode(cur: &mut Cursor) -> Result<Entry> {
        let id = ObjectId(cur.read_u32()?);
        let offset = cur.read_u32()? as u64;
        let length = cur.read_u32()? as u64;
        Ok(Entry { id, offset, length })
    }
}

fn overflow() -> Error {
    Error::InvalidArgument("content file exceeds u32 addressable range".to_string())
}

struct Inner {
    entries: Vec<Entry>, // kept sorted by offset
    content: File,
    lock_file: File,
    running: bool,
}

/// A packed blob store over `documents.dbx` + `contents.dbx` in a
/// configured directory. Thread-safe: all mutable state lives behind a
/// single mutex, so seek-bearing operations on the shared content file
/// serialize.
pub struct FileStore {
    dir: PathBuf,
    inner: Mutex<Option<Inner>>,
}

impl FileStore {
    /// Construct a store bound to `dir` without touching the filesystem.
    /// Call [`FileStore::start`] before use.
    pub fn new<P: AsRef<Path>>(dir: P) -> FileStore {
        FileStore {
            dir: dir.as_ref().to_path_buf(),
            inner: Mutex::new(None),
        }
    }

    /// Create `dir` if absent, load the entry table (an absent index
    /// file is treated as empty), and open the content file for
    /// read/write. Takes an advisory exclusive lock on the directory so
    /// a second process cannot open the same store concurrently.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.dir.join(LOCK_FILE))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|e| {
            Error::InvalidState(format!("store directory already locked: {}", e))
        })?;

        let entries = match fs::read(self.dir.join(INDEX_FILE)) {
            Ok(bytes) => decode_entries(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        let content = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.dir.join(CONTENT_FILE))?;

        log::info!(
            target: "xantippe::store",
            "started file store at {:?} with {} entries",
            self.dir,
            entries.len()
        );

        *guard = Some(Inner {
            entries,
            content,
            lock_file,
            running: true,
        });
        Ok(())
    }

    /// Flush the entry table and close the content file. Calling
    /// `shutdown` on a stopped store fails with `NotRunning`.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard
            .as_mut()
            .ok_or_else(|| Error::NotRunning("store".to_string()))?;
        write_index(&self.dir, &inner.entries)?;
        fs2::FileExt::unlock(&inner.lock_file).ok();
        log::debug!(target: "xantippe::store", "shut down file store at {:?}", self.dir);
        *guard = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.inner.lock().unwrap(), Some(i) if i.running)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard
            .as_mut()
            .ok_or_else(|| Error::NotRunning("store".to_string()))?;
        f(inner)
    }

    /// Replace any existing entry for `id` with the bytes read from
    /// `source`, placed by first-fit (see [`first_fit`]). On I/O
    /// failure the entry is removed so no orphan entry survives.
    pub fn store<R: Read>(&self, id: ObjectId, mut source: R) -> Result<()> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        let length = bytes.len() as u64;

        self.with_inner(|inner| {
            inner.entries.retain(|e| e.id != id);
            let offset = first_fit(&inner.entries, length);

            let result = (|| -> Result<()> {
                inner.content.seek_write_at(offset, &bytes)?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    let entry = Entry { id, offset, length };
                    let pos = inner
                        .entries
                        .binary_search_by_key(&offset, |e| e.offset)
                        .unwrap_or_else(|p| p);
                    inner.entries.insert(pos, entry);
                    log::debug!(
                        target: "xantippe::store",
                        "stored id={} at offset={} length={}",
                        id,
                        offset,
                        length
                    );
                    Ok(())
                }
                Err(e) => {
                    // entry was never recorded; nothing to undo on the
                    // table. surface the I/O failure as-is.
                    Err(e)
                }
            }
        })
    }

    /// Return a read-only, independently-cursored stream over the
    /// bytes recorded for `id`.
    pub fn retrieve(&self, id: ObjectId) -> Result<RetrieveStream> {
        self.with_inner(|inner| {
            let entry = find_entry(&inner.entries, id)?;
            let fd = inner.content.try_clone()?;
            Ok(RetrieveStream::new(fd, entry.offset, entry.length))
        })
    }

    /// Remove the entry for `id`. The bytes on disk are left in place;
    /// the slot becomes reclaimable by a future first-fit placement.
    pub fn delete(&self, id: ObjectId) -> Result<()> {
        self.with_inner(|inner| {
            let before = inner.entries.len();
            inner.entries.retain(|e| e.id != id);
            if inner.entries.len() == before {
                return Err(Error::not_found(format!("entry {}", id)));
            }
            log::trace!(target: "xantippe::store", "deleted id={}", id);
            Ok(())
        })
    }

    /// Clear all entries and truncate the content file to length 0.
    pub fn delete_all(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.entries.clear();
            inner.content.set_len(0)?;
            Ok(())
        })
    }

    /// Rewrite the index file via temp-file + rename and `fsync` the
    /// content file. Not a crash-consistent journal: a crash between
    /// a content write and this call can lose the most recent entries.
    pub fn sync(&self) -> Result<()> {
        self.with_inner(|inner| {
            if let Err(e) = write_index(&self.dir, &inner.entries) {
                log::warn!(target: "xantippe::store", "sync failed: {}", e);
                return Err(e);
            }
            inner.content.sync_all()?;
            Ok(())
        })
    }

    pub fn length(&self, id: ObjectId) -> Result<u64> {
        self.with_inner(|inner| Ok(find_entry(&inner.entries, id)?.length))
    }

    /// `(entry_count, content_len, live_bytes, gap_bytes)`. `gap_bytes`
    /// is derived from the same scan `first_fit` uses, not tracked as a
    /// second source of truth.
    pub fn size(&self) -> Result<(usize, u64, u64, u64)> {
        self.with_inner(|inner| {
            let content_len = inner.content.metadata()?.len();
            let live_bytes: u64 = inner.entries.iter().map(|e| e.length).sum();
            let mut cursor = 0u64;
            let mut gap_bytes = 0u64;
            for e in &inner.entries {
                if e.offset > cursor {
                    gap_bytes += e.offset - cursor;
                }
                cursor = e.offset + e.length;
            }
            Ok((inner.entries.len(), content_len, live_bytes, gap_bytes))
        })
    }
}

fn find_entry(entries: &[Entry], id: ObjectId) -> Result<Entry> {
    entries
        .iter()
        .find(|e| e.id == id)
        .copied()
        .ok_or_else(|| Error::not_found(format!("entry {}", id)))
}

/// First-fit placement: scan entries in ascending offset
/// order, maintaining a running `cursor`. Return the first gap at least
/// `required` bytes wide; otherwise append at the end.
pub(crate) fn first_fit(entries: &[Entry], required: u64) -> u64 {
    let mut cursor = 0u64;
    for e in entries {
        let free = e.offset.saturating_sub(cursor);
        if free >= required {
            return cursor;
        }
        cursor = e.offset + e.length;
    }
    cursor
}

fn decode_entries(bytes: &[u8]) -> Result<Vec<Entry>> {
    let mut cur = Cursor::new(bytes);
    let count = cur.read_u32()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(Entry::decode(&mut cur)?);
    }
    entries.sort();
    Ok(entries)
}

fn write_index(dir: &Path, entries: &[Entry]) -> Result<()> {
    let mut buf = Vec::new();
    util::write_u32(&mut buf, entries.len() as u32);
    for e in entries {
        e.encode(&mut buf)?;
    }
    util::write_atomic(&dir.join(INDEX_FILE), &buf)
}

/// Positional write, hiding the unix/windows `FileExt` split behind one
/// call site (mirrors the read-side split in [`crate::stream`]).
trait SeekWriteAt {
    fn seek_write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()>;
}

impl SeekWriteAt for File {
    #[cfg(unix)]
    fn seek_write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.write_at(buf, offset)?;
        Ok(())
    }

    #[cfg(windows)]
    fn seek_write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        use std::io::Seek;
        self.seek(std::io::SeekFrom::Start(offset))?;
        self.write_all(buf)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
