//! Top-level embedded database handle: wires the file
//! store, catalog, secondary index, lock manager and policy resolver
//! together into the single create/read/update/delete data flow.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::catalog::{Catalog, Collection, Document, IndexDef, Resolved};
use crate::codec;
use crate::error::{Error, Result};
use crate::index::SecondaryIndex;
use crate::lock::{Holder, LockManager};
use crate::policy;
use crate::query::{self, CollectionSource, DocumentSource, ModuleResolver};
use crate::types::{CompressionMode, ExplicitCompression, ExplicitValidation, MediaType, ObjectId, TypedValue, ValidationMode};
use crate::store::FileStore;

/// Construction-time settings. Everything else, such as a specific
/// collection's validation/compression override, is runtime state
/// living in the catalog, not configuration.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    /// How long a lock acquisition waits before failing with
    /// `Error::Timeout`. `None` blocks indefinitely.
    pub lock_timeout: Option<Duration>,
    /// Policy the root collection is created with the first time this
    /// data directory is started. Ignored on every subsequent start:
    /// an existing root's policy is catalog state, not configuration.
    pub default_validation: ValidationMode,
    pub default_compression: CompressionMode,
    /// Reserved knob for a future write-ahead journal size cap; the
    /// store's `sync()` is currently a direct rewrite-plus-fsync with
    /// no journal, so this has no effect yet.
    pub journal_limit: Option<u64>,
}

impl DatabaseConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> DatabaseConfig {
        DatabaseConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            lock_timeout: Some(Duration::from_secs(30)),
            default_validation: ValidationMode::Off,
            default_compression: CompressionMode::None,
            journal_limit: None,
        }
    }
}

struct Loaded {
    catalog: Catalog,
    index: SecondaryIndex,
}

/// The embedded database. Cheap to construct; [`Database::start`] does
/// the actual I/O (opening the content file, loading the catalog and
/// index). Safe to share across threads: every public method takes
/// `&self`.
pub struct Database {
    config: DatabaseConfig,
    store: FileStore,
    locks: LockManager,
    loaded: RwLock<Option<Loaded>>,
    next_holder: AtomicU64,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Database {
        let store = FileStore::new(&config.data_dir);
        Database {
            config,
            store,
            locks: LockManager::new(),
            loaded: RwLock::new(None),
            next_holder: AtomicU64::new(1),
        }
    }

    /// Bring the database up: open the content file, load
    /// `collections.dbx`/`metadata.dbx`/`indices.dbx` (synthesizing a
    /// default root collection on first start). Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.loaded.write().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        self.store.start()?;
        let catalog = Catalog::open_with_defaults(
            &self.config.data_dir,
            self.config.default_validation,
            self.config.default_compression,
        )?;
        let index = SecondaryIndex::open(&self.config.data_dir, &catalog)?;
        log::info!(target: "xantippe::database", "database started at {:?}", self.config.data_dir);
        *guard = Some(Loaded { catalog, index });
        Ok(())
    }

    /// Persist the catalog and index, then close the content file.
    /// Calling `shutdown` when not running fails with `NotRunning`.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.loaded.write().unwrap();
        let loaded = guard
            .as_ref()
            .ok_or_else(|| Error::NotRunning("database".to_string()))?;
        loaded.catalog.persist(&self.config.data_dir)?;
        loaded.index.persist(&self.config.data_dir)?;
        self.store.shutdown()?;
        *guard = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.loaded.read().unwrap().is_some() && self.store.is_running()
    }

    fn with_loaded<T>(&self, f: impl FnOnce(&Loaded) -> Result<T>) -> Result<T> {
        let guard = self.loaded.read().unwrap();
        let loaded = guard
            .as_ref()
            .ok_or_else(|| Error::NotRunning("database".to_string()))?;
        f(loaded)
    }

    /// Open a new logical session. Each connection gets its own lock
    /// holder identity, so reentrant locking is scoped per-connection
    /// rather than per-thread.
    pub fn connect(&self) -> Connection<'_> {
        let holder = Holder(self.next_holder.fetch_add(1, Ordering::SeqCst));
        Connection { db: self, holder }
    }

    /// The document URI resolver: returns the content stream for the
    /// document at `uri`. A URI that does not resolve to a document is
    /// not an error here — the query engine treats a missing document
    /// as an empty stream.
    pub fn resolve_document_uri(&self, uri: &str) -> Box<dyn Read + '_> {
        let id = match self.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Document(id) => Ok(id),
            Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
        }) {
            Ok(id) => id,
            Err(_) => return Box::new(std::io::empty()),
        };
        self.open_document(id).unwrap_or_else(|_| Box::new(std::io::empty()))
    }

    /// The collection URI resolver: enumerate the document URIs in the
    /// collection at `uri`. The only recognized parameter is `recurse`,
    /// which also descends into every child collection.
    pub fn resolve_collection_uri(&self, uri: &str, recurse: bool) -> Result<Vec<String>> {
        self.with_loaded(|l| {
            let id = match l.catalog.resolve_uri(uri)? {
                Resolved::Collection(id) => id,
                Resolved::Document(_) => return Err(Error::invalid_argument(format!("{} is a document", uri))),
            };
            let base = uri.trim_end_matches('/');
            let mut out = Vec::new();
            collect_document_uris(&l.catalog, id, base, recurse, &mut out)?;
            Ok(out)
        })
    }
}

impl CollectionSource for Database {
    fn collection_meta(&self, id: ObjectId) -> Result<Collection> {
        self.with_loaded(|l| l.catalog.collection(id))
    }

    fn resolve(&self, uri: &str) -> Result<ObjectId> {
        self.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Collection(id) => Ok(id),
            Resolved::Document(_) => Err(Error::invalid_argument(format!("{} is a document", uri))),
        })
    }

    fn find_documents(&self, collection_id: ObjectId, keys: &[(String, TypedValue)], recursive: bool) -> Result<Vec<ObjectId>> {
        self.with_loaded(|l| l.index.find_documents(&l.catalog, collection_id, keys, recursive))
    }
}

impl DocumentSource for Database {
    fn document_meta(&self, id: ObjectId) -> Result<Document> {
        self.with_loaded(|l| l.catalog.document(id))
    }

    fn open_document(&self, id: ObjectId) -> Result<Box<dyn Read + '_>> {
        self.with_loaded(|l| {
            let doc = l.catalog.document(id)?;
            let compression = policy::effective_compression(&l.catalog, doc.parent_id)?;
            let stream = self.store.retrieve(id)?;
            Ok(codec::decode_reader(compression, Box::new(stream)))
        })
    }
}

impl ModuleResolver for Database {
    /// Try each location hint in order (stripping a leading `file:`
    /// prefix) as a document URI; the first one that resolves to a
    /// readable, UTF-8 document wins. `namespace_uri` is carried only
    /// for the error message — nothing in this crate indexes modules by
    /// namespace.
    fn resolve_module(&self, namespace_uri: &str, location_hints: &[&str]) -> Result<String> {
        for hint in location_hints {
            let uri = query::strip_file_prefix(hint);
            let id = match self.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
                Resolved::Document(id) => Ok(id),
                Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
            }) {
                Ok(id) => id,
                Err(_) => continue,
            };
            let mut stream = match self.open_document(id) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let mut buf = Vec::new();
            if stream.read_to_end(&mut buf).is_err() {
                continue;
            }
            if let Ok(text) = String::from_utf8(buf) {
                return Ok(text);
            }
        }
        Err(Error::not_found(format!(
            "no location hint resolved a module for namespace {}",
            namespace_uri
        )))
    }
}

/// Enumerate the document URIs directly under `base` (whose id is
/// `col_id`), descending into child collections when `recurse`.
/// Mirrors the collection URI resolver's `recurse=yes|true` parameter.
fn collect_document_uris(catalog: &Catalog, col_id: ObjectId, base: &str, recurse: bool, out: &mut Vec<String>) -> Result<()> {
    let col = catalog.collection(col_id)?;
    for doc_id in &col.documents {
        let doc = catalog.document(*doc_id)?;
        out.push(format!("{}/{}", base, doc.name));
    }
    if recurse {
        for child_id in &col.children {
            let child = catalog.collection(*child_id)?;
            let child_base = format!("{}/{}", base, child.name);
            collect_document_uris(catalog, *child_id, &child_base, recurse, out)?;
        }
    }
    Ok(())
}

/// A logical session against a [`Database`]: its lock holder identity.
/// Cloning a `Database` handle and connecting twice models two
/// independent clients; reentrant locking only collapses acquisitions
/// made through the *same* `Connection`.
pub struct Connection<'a> {
    db: &'a Database,
    holder: Holder,
}

impl<'a> Connection<'a> {
    pub fn holder(&self) -> Holder {
        self.holder
    }

    pub fn root_collection(&self) -> Result<ObjectId> {
        self.db.with_loaded(|l| Ok(l.catalog.root_id()))
    }

    pub fn get_collection(&self, uri: &str) -> Result<Collection> {
        self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Collection(id) => l.catalog.collection(id),
            Resolved::Document(_) => Err(Error::invalid_argument(format!("{} is a document", uri))),
        })
    }

    pub fn get_document(&self, uri: &str) -> Result<Document> {
        self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Document(id) => l.catalog.document(id),
            Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
        })
    }

    /// Open a read stream over a document's logical (decompressed)
    /// content. Acquires the document's own read lock plus a read lock
    /// on its parent collection chain up to the root (`lockReadDoc`),
    /// held only for the duration of this call — the returned stream
    /// carries no guard, so a caller that needs the lock held across
    /// the whole read must acquire it separately beforehand.
    pub fn read_document(&self, uri: &str) -> Result<Box<dyn Read + '_>> {
        let (id, parent_id) = self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Document(id) => Ok((id, l.catalog.parent_of_document(id)?)),
            Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
        })?;
        let _guard = self.lock_read_doc(id, parent_id)?;
        self.db.open_document(id)
    }

    pub fn create_collection(&self, parent_uri: &str, name: &str) -> Result<ObjectId> {
        let parent_id = self.resolve_collection(parent_uri)?;
        let _guard = self.lock_write(parent_id)?;
        self.db.with_loaded(|l| l.catalog.create_child_collection(parent_id, name))
    }

    pub fn delete_collection(&self, uri: &str, recursive: bool) -> Result<()> {
        let id = self.resolve_collection(uri)?;
        let parent_id = self
            .db
            .with_loaded(|l| l.catalog.parent_of_collection(id))?
            .ok_or_else(|| Error::invalid_state("cannot delete the root collection"))?;
        let _guard = self.lock_write(parent_id)?;
        self.db.with_loaded(|l| l.catalog.delete_collection(id, recursive))
    }

    pub fn set_validation(&self, uri: &str, mode: ExplicitValidation) -> Result<()> {
        let id = self.resolve_collection(uri)?;
        let _guard = self.lock_write(id)?;
        self.db.with_loaded(|l| l.catalog.set_validation(id, mode))
    }

    pub fn set_compression(&self, uri: &str, mode: ExplicitCompression) -> Result<()> {
        let id = self.resolve_collection(uri)?;
        let _guard = self.lock_write(id)?;
        self.db.with_loaded(|l| l.catalog.set_compression(id, mode))
    }

    pub fn add_index_def(&self, uri: &str, def: IndexDef) -> Result<()> {
        let id = self.resolve_collection(uri)?;
        let _guard = self.lock_write(id)?;
        self.db.with_loaded(|l| l.catalog.add_index_def(id, def))
    }

    /// Create a document under `parent_uri`. Runs the full write path:
    /// acquire the parent's write lock, validate per the
    /// effective validation policy, compress per the effective
    /// compression policy, place the bytes in the file store, record
    /// the catalog entry, then index the supplied keys.
    pub fn create_document(
        &self,
        parent_uri: &str,
        name: &str,
        media_type: MediaType,
        content: &[u8],
        keys: Vec<(String, TypedValue)>,
    ) -> Result<ObjectId> {
        let parent_id = self.resolve_collection(parent_uri)?;
        let _guard = self.lock_write(parent_id)?;

        let (validation, compression) = self.db.with_loaded(|l| {
            Ok((
                policy::effective_validation(&l.catalog, parent_id)?,
                policy::effective_compression(&l.catalog, parent_id)?,
            ))
        })?;
        validate(validation, media_type, content)?;
        let stored = codec::encode(compression, content)?;

        let id = self.db.with_loaded(|l| l.catalog.create_document(parent_id, name, media_type))?;
        if let Err(e) = self.db.store.store(id, stored.as_slice()) {
            self.db.with_loaded(|l| l.catalog.delete_document(id)).ok();
            return Err(e);
        }
        self.db.with_loaded(|l| {
            l.catalog
                .update_document_content(id, content.len() as u64, stored.len() as u64, keys.clone())?;
            for (key_name, value) in &keys {
                l.index.index_document(parent_id, key_name, value, id);
            }
            Ok(())
        })?;
        Ok(id)
    }

    /// Overwrite an existing document's content and keys in place.
    pub fn update_document(&self, uri: &str, content: &[u8], keys: Vec<(String, TypedValue)>) -> Result<()> {
        let (id, parent_id) = self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Document(id) => Ok((id, l.catalog.parent_of_document(id)?)),
            Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
        })?;
        let _guard = self.lock_write_doc(id, parent_id)?;

        let (validation, compression, media_type) = self.db.with_loaded(|l| {
            Ok((
                policy::effective_validation(&l.catalog, parent_id)?,
                policy::effective_compression(&l.catalog, parent_id)?,
                l.catalog.document(id)?.media_type,
            ))
        })?;
        validate(validation, media_type, content)?;
        let stored = codec::encode(compression, content)?;

        self.db.store.store(id, stored.as_slice())?;
        self.db.with_loaded(|l| {
            l.index.remove_document(parent_id, id);
            l.catalog
                .update_document_content(id, content.len() as u64, stored.len() as u64, keys.clone())?;
            for (key_name, value) in &keys {
                l.index.index_document(parent_id, key_name, value, id);
            }
            Ok(())
        })
    }

    pub fn delete_document(&self, uri: &str) -> Result<()> {
        let (id, parent_id) = self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Document(id) => Ok((id, l.catalog.parent_of_document(id)?)),
            Resolved::Collection(_) => Err(Error::invalid_argument(format!("{} is a collection", uri))),
        })?;
        let _guard = self.lock_write(parent_id)?;
        self.db.with_loaded(|l| {
            l.index.remove_document(parent_id, id);
            l.catalog.delete_document(id)
        })?;
        self.db.store.delete(id)
    }

    pub fn find_documents(&self, collection_uri: &str, keys: &[(String, TypedValue)], recursive: bool) -> Result<Vec<ObjectId>> {
        let id = self.resolve_collection(collection_uri)?;
        let _guard = self.lock_read(id)?;
        self.db.with_loaded(|l| l.index.find_documents(&l.catalog, id, keys, recursive))
    }

    /// The query-engine seam: this crate ships no query
    /// language of its own, so every call fails until the embedding
    /// application wires in an engine built on [`crate::query`].
    pub fn execute_query(&self, _text: &str) -> Result<Vec<ObjectId>> {
        Err(Error::QueryFailed("no query engine configured".to_string()))
    }

    fn resolve_collection(&self, uri: &str) -> Result<ObjectId> {
        self.db.with_loaded(|l| match l.catalog.resolve_uri(uri)? {
            Resolved::Collection(id) => Ok(id),
            Resolved::Document(_) => Err(Error::invalid_argument(format!("{} is a document", uri))),
        })
    }

    fn lock_read(&self, id: ObjectId) -> Result<crate::lock::Guard<'_>> {
        self.db
            .with_loaded(|l| self.db.locks.lock_read(&l.catalog, self.holder, id, self.db.config.lock_timeout))
    }

    fn lock_write(&self, id: ObjectId) -> Result<crate::lock::Guard<'_>> {
        self.db
            .with_loaded(|l| self.db.locks.lock_write(&l.catalog, self.holder, id, self.db.config.lock_timeout))
    }

    /// `lockReadDoc`: read-lock the document itself plus its parent
    /// collection chain up to the root. `doc_id` is never a key in the
    /// catalog's collection map, so this cannot reuse `lock_read`.
    fn lock_read_doc(&self, doc_id: ObjectId, parent_id: ObjectId) -> Result<crate::lock::Guard<'_>> {
        self.db.with_loaded(|l| {
            self.db
                .locks
                .lock_read_doc(&l.catalog, self.holder, doc_id, parent_id, self.db.config.lock_timeout)
        })
    }

    /// `lockWriteDoc`: write-lock the document itself, read-lock its
    /// parent collection chain.
    fn lock_write_doc(&self, doc_id: ObjectId, parent_id: ObjectId) -> Result<crate::lock::Guard<'_>> {
        self.db.with_loaded(|l| {
            self.db
                .locks
                .lock_write_doc(&l.catalog, self.holder, doc_id, parent_id, self.db.config.lock_timeout)
        })
    }
}

/// Policy gate for document validation. There is no
/// bundled schema validator: `Off` always passes, `On`/`Auto` apply a
/// minimal well-formedness check for XML media types and pass
/// everything else through, leaving real schema validation to a
/// higher layer.
fn validate(mode: ValidationMode, media_type: MediaType, content: &[u8]) -> Result<()> {
    if mode == ValidationMode::Off || media_type != MediaType::Xml {
        return Ok(());
    }
    let trimmed = content.iter().position(|b| !b.is_ascii_whitespace());
    match trimmed {
        Some(i) if content[i] == b'<' => Ok(()),
        _ => Err(Error::ValidationFailed("document is not well-formed XML".to_string())),
    }
}

/// Keys live [`Database`] handles by name, so two callers asking for
/// the same named database get the same handle instead of racing two
/// independent `FileStore`s over the same pair of files.
pub struct DatabaseManager {
    databases: Mutex<HashMap<String, Arc<Database>>>,
}

impl DatabaseManager {
    pub fn new() -> DatabaseManager {
        DatabaseManager {
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for `name`, creating and starting it with
    /// `config` if this is the first open. `config` is ignored on
    /// subsequent opens of an already-live `name`; the first opener's
    /// settings win for the lifetime of the process.
    pub fn open(&self, name: &str, config: DatabaseConfig) -> Result<Arc<Database>> {
        let mut databases = self.databases.lock().unwrap();
        if let Some(db) = databases.get(name) {
            return Ok(db.clone());
        }
        let db = Arc::new(Database::new(config));
        db.start()?;
        databases.insert(name.to_string(), db.clone());
        Ok(db)
    }

    /// Shut down and forget the handle for `name`, if open. A later
    /// `open` call mints a fresh handle.
    pub fn close(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.lock().unwrap();
        if let Some(db) = databases.remove(name) {
            db.shutdown()?;
        }
        Ok(())
    }
}

impl Default for DatabaseManager {
    fn default() -> DatabaseManager {
        DatabaseManager::new()
    }
}

#[cfg(test)]
#[path = "database_test.rs"]
mod database_test;
