//! Secondary index over typed document keys, and its persistence to
//! `indices.dbx`.
//!
//! One [`SecondaryIndex`] instance owns every collection's index; each
//! collection's slice of the map is `keyName -> value -> set<docId>`.
//! Lookups never touch the catalog directly; callers resolve the
//! collection id first and hand it in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::types::{IndexType, ObjectId, TypedValue, TypedValueKey};
use crate::util::{self, Cursor};

pub const INDICES_FILE: &str = "indices.dbx";

type ValueMap = BTreeMap<TypedValueKey, HashSet<ObjectId>>;

struct CollectionIndex {
    by_key: HashMap<String, (IndexType, ValueMap)>,
}

impl CollectionIndex {
    fn new() -> CollectionIndex {
        CollectionIndex {
            by_key: HashMap::new(),
        }
    }

    fn insert(&mut self, key_name: &str, value: &TypedValue, doc_id: ObjectId) {
        let entry = self
            .by_key
            .entry(key_name.to_string())
            .or_insert_with(|| (value.index_type(), BTreeMap::new()));
        entry
            .1
            .entry(value.sort_key())
            .or_insert_with(HashSet::new)
            .insert(doc_id);
    }

    fn remove_document(&mut self, doc_id: ObjectId) {
        for (_, values) in self.by_key.values_mut() {
            for set in values.values_mut() {
                set.remove(&doc_id);
            }
        }
    }

    fn lookup(&self, key_name: &str, value: &TypedValue) -> HashSet<ObjectId> {
        self.by_key
            .get(key_name)
            .and_then(|(_, values)| values.get(&value.sort_key()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Per-collection map of indexed document keys, queried by conjunctive
/// (all keys must match) lookup with optional recursive descent into
/// child collections.
pub struct SecondaryIndex {
    collections: Mutex<HashMap<ObjectId, CollectionIndex>>,
}

impl SecondaryIndex {
    pub fn new() -> SecondaryIndex {
        SecondaryIndex {
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Load `indices.dbx` from `dir`, if present. Referenced document
    /// ids that no longer exist in `catalog` are dropped with a warning;
    /// this tolerates an index file that is stale relative to
    /// `collections.dbx`.
    pub fn open(dir: &Path, catalog: &Catalog) -> Result<SecondaryIndex> {
        let bytes = match fs::read(dir.join(INDICES_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SecondaryIndex::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut cur = Cursor::new(&bytes);
        let mut collections = HashMap::new();
        let col_count = cur.read_u32()?;
        let mut dropped = 0u32;
        for _ in 0..col_count {
            let col_id = ObjectId(cur.read_u32()?);
            let mut index = CollectionIndex::new();
            let key_count = cur.read_u32()?;
            for _ in 0..key_count {
                let key_name = cur.read_utf8()?;
                let typ = IndexType::from_byte(cur.read_u8()?)?;
                let value_count = cur.read_u32()?;
                for _ in 0..value_count {
                    let value = TypedValue::decode_from(typ, &mut cur)?;
                    let doc_count = cur.read_u32()?;
                    for _ in 0..doc_count {
                        let doc_id = ObjectId(cur.read_u32()?);
                        if catalog.document(doc_id).is_ok() {
                            index.insert(&key_name, &value, doc_id);
                        } else {
                            dropped += 1;
                        }
                    }
                }
            }
            collections.insert(col_id, index);
        }
        if dropped > 0 {
            log::warn!(
                target: "xantippe::index",
                "dropped {} stale document references while loading {}",
                dropped,
                INDICES_FILE
            );
        }
        log::info!(
            target: "xantippe::index",
            "loaded index: {} collections with index entries",
            collections.len()
        );
        Ok(SecondaryIndex {
            collections: Mutex::new(collections),
        })
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        let collections = self.collections.lock().unwrap();
        let mut buf = Vec::new();
        util::write_u32(&mut buf, collections.len() as u32);
        for (col_id, index) in collections.iter() {
            util::write_u32(&mut buf, col_id.0);
            util::write_u32(&mut buf, index.by_key.len() as u32);
            for (key_name, (typ, values)) in &index.by_key {
                util::write_utf8(&mut buf, key_name);
                util::write_u8(&mut buf, typ.to_byte());
                util::write_u32(&mut buf, values.len() as u32);
                for (key, doc_ids) in values {
                    encode_value(*typ, key, &mut buf);
                    util::write_u32(&mut buf, doc_ids.len() as u32);
                    let mut sorted: Vec<u32> = doc_ids.iter().map(|d| d.0).collect();
                    sorted.sort_unstable();
                    for id in sorted {
                        util::write_u32(&mut buf, id);
                    }
                }
            }
        }
        util::write_atomic(&dir.join(INDICES_FILE), &buf)
    }

    /// Record that `doc_id` under `col_id` carries `key_name = value`.
    /// Called once per key after a document write completes.
    pub fn index_document(&self, col_id: ObjectId, key_name: &str, value: &TypedValue, doc_id: ObjectId) {
        self.collections
            .lock()
            .unwrap()
            .entry(col_id)
            .or_insert_with(CollectionIndex::new)
            .insert(key_name, value, doc_id);
    }

    /// Remove every trace of `doc_id` from `col_id`'s index, e.g. before
    /// reindexing an updated document or on delete.
    pub fn remove_document(&self, col_id: ObjectId, doc_id: ObjectId) {
        if let Some(index) = self.collections.lock().unwrap().get_mut(&col_id) {
            index.remove_document(doc_id);
        }
    }

    /// Conjunctive lookup: every `(keyName, value)` pair must match the
    /// same document. `keys` must be non-empty. When `recursive`, the
    /// result also includes matches from every descendant collection of
    /// `col_id`.
    pub fn find_documents(
        &self,
        catalog: &Catalog,
        col_id: ObjectId,
        keys: &[(String, TypedValue)],
        recursive: bool,
    ) -> Result<Vec<ObjectId>> {
        if keys.is_empty() {
            return Err(Error::invalid_argument("findDocuments requires at least one key"));
        }
        let mut result = self.find_local(col_id, keys);
        if recursive {
            let children = catalog.collection(col_id)?.children;
            for child in children {
                result.extend(self.find_documents(catalog, child, keys, true)?);
            }
        }
        let mut ids: Vec<ObjectId> = result.into_iter().collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn find_local(&self, col_id: ObjectId, keys: &[(String, TypedValue)]) -> HashSet<ObjectId> {
        let collections = self.collections.lock().unwrap();
        let index = match collections.get(&col_id) {
            Some(index) => index,
            None => return HashSet::new(),
        };

        let mut sets: Vec<HashSet<ObjectId>> = keys
            .iter()
            .map(|(name, value)| index.lookup(name, value))
            .collect();
        sets.sort_by_key(|s| s.len());
        let mut iter = sets.into_iter();
        let mut acc = match iter.next() {
            Some(s) => s,
            None => return HashSet::new(),
        };
        for s in iter {
            acc.retain(|id| s.contains(id));
            if acc.is_empty() {
                break;
            }
        }
        acc
    }
}

fn encode_value(typ: IndexType, key: &TypedValueKey, buf: &mut Vec<u8>) {
    match (typ, key) {
        (IndexType::String, TypedValueKey::Str(s)) => util::write_utf8(buf, s),
        (IndexType::Int, TypedValueKey::Long(n)) => util::write_u32(buf, *n as i32 as u32),
        (IndexType::Long, TypedValueKey::Long(n)) => util::write_i64(buf, *n),
        (IndexType::Date, TypedValueKey::Long(n)) => util::write_i64(buf, *n),
        (IndexType::Float, TypedValueKey::Bits(bits)) => util::write_u32(buf, *bits as u32),
        (IndexType::Double, TypedValueKey::Bits(bits)) => util::write_u64(buf, *bits),
        _ => unreachable!("TypedValueKey variant always matches its IndexType"),
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
