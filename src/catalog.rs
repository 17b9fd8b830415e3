//! In-memory collection/document tree plus its depth-first binary
//! persistence.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{
    ExplicitCompression, ExplicitValidation, IndexType, MediaType, Mode, ObjectId, TypedValue,
    ValidationMode,
};
use crate::util::{self, Cursor};

pub const METADATA_FILE: &str = "metadata.dbx";
pub const COLLECTIONS_FILE: &str = "collections.dbx";

/// A secondary-index definition attached to a collection. Applies, by inheritance, to the owning
/// collection and all descendants, see [`crate::policy`].
#[derive(Clone, Debug)]
pub struct IndexDef {
    pub id: ObjectId,
    pub name: String,
    pub xpath: String,
    pub typ: IndexType,
}

/// A named leaf carrying bytes out-of-line (in the [`crate::store::FileStore`]),
/// a media type, and optional typed keys.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: ObjectId,
    pub name: String,
    pub parent_id: ObjectId,
    pub media_type: MediaType,
    pub length: u64,
    pub stored_length: u64,
    pub created: i64,
    pub modified: i64,
    pub keys: Vec<(String, TypedValue)>,
}

impl Document {
    pub fn key(&self, name: &str) -> Option<&TypedValue> {
        self.keys.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A named node in the namespace tree.
#[derive(Clone, Debug)]
pub struct Collection {
    pub id: ObjectId,
    pub name: String,
    pub parent_id: Option<ObjectId>, // None only for the root
    pub validation: ExplicitValidation,
    pub compression: ExplicitCompression,
    pub index_defs: Vec<IndexDef>,
    pub children: Vec<ObjectId>,  // child collections, creation order
    pub documents: Vec<ObjectId>, // child documents, creation order
}

/// What a URI resolves to.
#[derive(Clone, Copy, Debug)]
pub enum Resolved {
    Collection(ObjectId),
    Document(ObjectId),
}

struct Tree {
    collections: HashMap<ObjectId, Collection>,
    documents: HashMap<ObjectId, Document>,
    root_id: ObjectId,
}

/// Holds the in-memory tree and persists it to `collections.dbx`.
/// The catalog exclusively owns all collections,
/// documents, and their id allocation; callers navigate exclusively
/// through it.
pub struct Catalog {
    tree: Mutex<Tree>,
    next_id: AtomicU32,
}

impl Catalog {
    /// Load `metadata.dbx`/`collections.dbx` from `dir`, or synthesize a
    /// default root collection named `db` if `collections.dbx` is
    /// absent. Equivalent to
    /// [`Catalog::open_with_defaults`] with `Off`/`None` root policy.
    pub fn open(dir: &Path) -> Result<Catalog> {
        Catalog::open_with_defaults(dir, ValidationMode::Off, crate::types::CompressionMode::None)
    }

    /// As [`Catalog::open`], but a freshly synthesized root collection
    /// (only ever created once, on a brand new data directory) carries
    /// `default_validation`/`default_compression` instead of
    /// hardcoded `Off`/`None`. Has no effect when `collections.dbx`
    /// already exists: an existing root's policy is never overwritten
    /// by configuration.
    pub fn open_with_defaults(
        dir: &Path,
        default_validation: ValidationMode,
        default_compression: crate::types::CompressionMode,
    ) -> Result<Catalog> {
        let next_id = match fs::read(dir.join(METADATA_FILE)) {
            Ok(bytes) => {
                let mut cur = Cursor::new(&bytes);
                cur.read_u32()?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 1,
            Err(e) => return Err(Error::Io(e)),
        };

        let tree = match fs::read(dir.join(COLLECTIONS_FILE)) {
            Ok(bytes) => decode_tree(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                default_tree(default_validation, default_compression)
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let max_seen = tree
            .collections
            .keys()
            .chain(tree.documents.keys())
            .map(|id| id.0)
            .max()
            .unwrap_or(0);
        let next_id = next_id.max(max_seen + 1);

        log::info!(
            target: "xantippe::catalog",
            "loaded catalog: {} collections, {} documents, nextId={}",
            tree.collections.len(),
            tree.documents.len(),
            next_id
        );

        Ok(Catalog {
            tree: Mutex::new(tree),
            next_id: AtomicU32::new(next_id),
        })
    }

    /// Persist `metadata.dbx` and `collections.dbx` to `dir`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let tree = self.tree.lock().unwrap();
        let mut meta = Vec::new();
        util::write_u32(&mut meta, self.next_id.load(Ordering::SeqCst));
        util::write_atomic(&dir.join(METADATA_FILE), &meta)?;

        let mut buf = Vec::new();
        encode_collection(&tree, tree.root_id, &mut buf)?;
        util::write_atomic(&dir.join(COLLECTIONS_FILE), &buf)
    }

    fn mint_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn root_id(&self) -> ObjectId {
        self.tree.lock().unwrap().root_id
    }

    pub fn collection(&self, id: ObjectId) -> Result<Collection> {
        self.tree
            .lock()
            .unwrap()
            .collections
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection {}", id)))
    }

    pub fn document(&self, id: ObjectId) -> Result<Document> {
        self.tree
            .lock()
            .unwrap()
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("document {}", id)))
    }

    /// Resolve an absolute URI left-to-right through
    /// the tree.
    pub fn resolve_uri(&self, uri: &str) -> Result<Resolved> {
        let segments = util::split_uri(uri)?;
        let tree = self.tree.lock().unwrap();
        let mut current = tree.root_id;
        for (i, seg) in segments.iter().enumerate() {
            let col = tree
                .collections
                .get(&current)
                .ok_or_else(|| Error::not_found(format!("collection {}", current)))?;
            if let Some(child_id) = col
                .children
                .iter()
                .find(|cid| tree.collections.get(cid).map(|c| c.name.as_str()) == Some(*seg))
            {
                current = *child_id;
                continue;
            }
            if let Some(doc_id) = col
                .documents
                .iter()
                .find(|did| tree.documents.get(did).map(|d| d.name.as_str()) == Some(*seg))
            {
                if i + 1 != segments.len() {
                    return Err(Error::not_found(format!(
                        "{} is a document, not a collection",
                        seg
                    )));
                }
                return Ok(Resolved::Document(*doc_id));
            }
            return Err(Error::not_found(format!("no such segment: {}", seg)));
        }
        Ok(Resolved::Collection(current))
    }

    fn check_name_free(tree: &Tree, parent: &Collection, name: &str) -> Result<()> {
        let taken = parent
            .children
            .iter()
            .any(|c| tree.collections.get(c).map(|c| c.name.as_str()) == Some(name))
            || parent
                .documents
                .iter()
                .any(|d| tree.documents.get(d).map(|d| d.name.as_str()) == Some(name));
        if taken {
            Err(Error::name_in_use(name))
        } else {
            Ok(())
        }
    }

    /// Create a child collection of `parent_id` named `name`, inheriting
    /// `INHERIT` policy by default.
    pub fn create_child_collection(&self, parent_id: ObjectId, name: &str) -> Result<ObjectId> {
        let id = self.mint_id();
        let mut tree = self.tree.lock().unwrap();
        let parent = tree
            .collections
            .get(&parent_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection {}", parent_id)))?;
        Catalog::check_name_free(&tree, &parent, name)?;

        let col = Collection {
            id,
            name: name.to_string(),
            parent_id: Some(parent_id),
            validation: Mode::Inherit,
            compression: Mode::Inherit,
            index_defs: Vec::new(),
            children: Vec::new(),
            documents: Vec::new(),
        };
        tree.collections.insert(id, col);
        tree.collections
            .get_mut(&parent_id)
            .unwrap()
            .children
            .push(id);
        Ok(id)
    }

    /// Register a new document's metadata under `parent_id`. The caller
    /// (the `Database` data-flow) is responsible for writing
    /// the bytes into the file store before or after this call.
    pub fn create_document(
        &self,
        parent_id: ObjectId,
        name: &str,
        media_type: MediaType,
    ) -> Result<ObjectId> {
        let id = self.mint_id();
        let mut tree = self.tree.lock().unwrap();
        let parent = tree
            .collections
            .get(&parent_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection {}", parent_id)))?;
        Catalog::check_name_free(&tree, &parent, name)?;

        let now = crate::types::now_millis();
        let doc = Document {
            id,
            name: name.to_string(),
            parent_id,
            media_type,
            length: 0,
            stored_length: 0,
            created: now,
            modified: now,
            keys: Vec::new(),
        };
        tree.documents.insert(id, doc);
        tree.collections
            .get_mut(&parent_id)
            .unwrap()
            .documents
            .push(id);
        Ok(id)
    }

    fn check_keys_unique(keys: &[(String, TypedValue)]) -> Result<()> {
        for (i, (name, _)) in keys.iter().enumerate() {
            if keys[..i].iter().any(|(other, _)| other == name) {
                return Err(Error::name_in_use(name));
            }
        }
        Ok(())
    }

    /// Update a document's length bookkeeping and keys after its content
    /// has been (re)written (close-of-write).
    pub fn update_document_content(
        &self,
        id: ObjectId,
        length: u64,
        stored_length: u64,
        keys: Vec<(String, TypedValue)>,
    ) -> Result<()> {
        Catalog::check_keys_unique(&keys)?;
        let mut tree = self.tree.lock().unwrap();
        let doc = tree
            .documents
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("document {}", id)))?;
        doc.length = length;
        doc.stored_length = stored_length;
        doc.modified = crate::types::now_millis();
        doc.keys = keys;
        Ok(())
    }

    /// Delete a document (removes it from its parent's set).
    pub fn delete_document(&self, id: ObjectId) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        let doc = tree
            .documents
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("document {}", id)))?;
        if let Some(parent) = tree.collections.get_mut(&doc.parent_id) {
            parent.documents.retain(|d| *d != id);
        }
        Ok(())
    }

    /// Delete a collection. Non-empty collections require
    /// `recursive = true`; deletion cascades to all descendants and
    /// their documents.
    pub fn delete_collection(&self, id: ObjectId, recursive: bool) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        if id == tree.root_id {
            return Err(Error::invalid_state("cannot delete the root collection"));
        }
        let col = tree
            .collections
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection {}", id)))?;
        if !recursive && (!col.children.is_empty() || !col.documents.is_empty()) {
            return Err(Error::invalid_state(format!(
                "collection {} is not empty",
                id
            )));
        }

        let mut stack = vec![id];
        let mut victims = Vec::new();
        while let Some(cid) = stack.pop() {
            let c = tree.collections.get(&cid).cloned();
            if let Some(c) = c {
                stack.extend(c.children.iter().copied());
                victims.push(cid);
            }
        }
        for cid in &victims {
            if let Some(c) = tree.collections.remove(cid) {
                for did in c.documents {
                    tree.documents.remove(&did);
                }
            }
        }
        if let Some(parent_id) = col.parent_id {
            if let Some(parent) = tree.collections.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
        }
        Ok(())
    }

    /// Rename a collection or document in place, checking for
    /// name-collision against its siblings.
    pub fn rename(&self, resolved: Resolved, new_name: &str) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        match resolved {
            Resolved::Collection(id) => {
                let parent_id = tree
                    .collections
                    .get(&id)
                    .ok_or_else(|| Error::not_found(format!("collection {}", id)))?
                    .parent_id;
                if let Some(parent_id) = parent_id {
                    let parent = tree.collections.get(&parent_id).cloned().unwrap();
                    Catalog::check_name_free(&tree, &parent, new_name)?;
                }
                tree.collections.get_mut(&id).unwrap().name = new_name.to_string();
            }
            Resolved::Document(id) => {
                let parent_id = tree
                    .documents
                    .get(&id)
                    .ok_or_else(|| Error::not_found(format!("document {}", id)))?
                    .parent_id;
                let parent = tree.collections.get(&parent_id).cloned().unwrap();
                Catalog::check_name_free(&tree, &parent, new_name)?;
                tree.documents.get_mut(&id).unwrap().name = new_name.to_string();
            }
        }
        Ok(())
    }

    pub fn set_validation(&self, id: ObjectId, mode: ExplicitValidation) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        if id == tree.root_id && matches!(mode, Mode::Inherit) {
            return Err(Error::invalid_state("root validation mode cannot be INHERIT"));
        }
        let col = tree
            .collections
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("collection {}", id)))?;
        col.validation = mode;
        Ok(())
    }

    pub fn set_compression(&self, id: ObjectId, mode: ExplicitCompression) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        if id == tree.root_id && matches!(mode, Mode::Inherit) {
            return Err(Error::invalid_state("root compression mode cannot be INHERIT"));
        }
        let col = tree
            .collections
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("collection {}", id)))?;
        col.compression = mode;
        Ok(())
    }

    /// Add an index definition to `id`. Rejected with `NameInUse` if the
    /// name is already defined at this level or any ancestor (index
    /// definitions are additive along the inheritance chain; a name
    /// can only be claimed once per lineage).
    pub fn add_index_def(&self, id: ObjectId, def: IndexDef) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let c = tree
                .collections
                .get(&cid)
                .ok_or_else(|| Error::not_found(format!("collection {}", cid)))?;
            chain.push(cid);
            cur = c.parent_id;
        }
        for cid in &chain {
            if tree
                .collections
                .get(cid)
                .unwrap()
                .index_defs
                .iter()
                .any(|d| d.name == def.name)
            {
                return Err(Error::name_in_use(def.name));
            }
        }
        tree.collections.get_mut(&id).unwrap().index_defs.push(def);
        Ok(())
    }

    /// Ancestor chain from `id` up to (and including) the root,
    /// nearest-first. Used by [`crate::policy`] and the lock manager.
    pub fn ancestors(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let tree = self.tree.lock().unwrap();
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let c = tree
                .collections
                .get(&cid)
                .ok_or_else(|| Error::not_found(format!("collection {}", cid)))?;
            chain.push(cid);
            cur = c.parent_id;
        }
        Ok(chain)
    }

    pub fn parent_of_document(&self, id: ObjectId) -> Result<ObjectId> {
        Ok(self.document(id)?.parent_id)
    }

    pub fn parent_of_collection(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.collection(id)?.parent_id)
    }
}

fn default_tree(validation: ValidationMode, compression: crate::types::CompressionMode) -> Tree {
    let root = Collection {
        id: ObjectId(0),
        name: "db".to_string(),
        parent_id: None,
        validation: Mode::Explicit(validation),
        compression: Mode::Explicit(compression),
        index_defs: Vec::new(),
        children: Vec::new(),
        documents: Vec::new(),
    };
    let mut collections = HashMap::new();
    let root_id = root.id;
    collections.insert(root_id, root);
    Tree {
        collections,
        documents: HashMap::new(),
        root_id,
    }
}

fn encode_collection(tree: &Tree, id: ObjectId, buf: &mut Vec<u8>) -> Result<()> {
    let col = tree
        .collections
        .get(&id)
        .ok_or_else(|| Error::not_found(format!("collection {}", id)))?;

    util::write_u32(buf, col.id.0);
    util::write_utf8(buf, &col.name);
    util::write_u8(buf, col.validation.to_byte());
    util::write_u8(buf, col.compression.to_byte());

    util::write_u32(buf, col.index_defs.len() as u32);
    for def in &col.index_defs {
        util::write_u32(buf, def.id.0);
        util::write_utf8(buf, &def.name);
        util::write_utf8(buf, &def.xpath);
        util::write_u8(buf, def.typ.to_byte());
    }

    util::write_u32(buf, col.documents.len() as u32);
    for did in &col.documents {
        let doc = tree
            .documents
            .get(did)
            .ok_or_else(|| Error::not_found(format!("document {}", did)))?;
        util::write_u32(buf, doc.id.0);
        util::write_utf8(buf, &doc.name);
        util::write_u8(buf, doc.media_type.to_byte());
        util::write_u32(buf, doc.length.try_into().map_err(|_| too_big())?);
        util::write_u32(buf, doc.stored_length.try_into().map_err(|_| too_big())?);
        util::write_i64(buf, doc.created);
        util::write_i64(buf, doc.modified);
        util::write_u32(buf, doc.keys.len() as u32);
        for (name, value) in &doc.keys {
            util::write_utf8(buf, name);
            util::write_u8(buf, value.index_type().to_byte());
            value.encode(buf);
        }
    }

    util::write_u32(buf, col.children.len() as u32);
    for cid in &col.children {
        encode_collection(tree, *cid, buf)?;
    }
    Ok(())
}

fn too_big() -> Error {
    Error::invalid_argument("document length exceeds u32 range")
}

fn decode_collection(
    cur: &mut Cursor,
    parent_id: Option<ObjectId>,
    collections: &mut HashMap<ObjectId, Collection>,
    documents: &mut HashMap<ObjectId, Document>,
) -> Result<ObjectId> {
    let id = ObjectId(cur.read_u32()?);
    let name = cur.read_utf8()?;
    let validation = ExplicitValidation::from_byte(cur.read_u8()?)?;
    let compression = ExplicitCompression::from_byte(cur.read_u8()?)?;

    let index_count = cur.read_u32()?;
    let mut index_defs = Vec::with_capacity(index_count as usize);
    for _ in 0..index_count {
        index_defs.push(IndexDef {
            id: ObjectId(cur.read_u32()?),
            name: cur.read_utf8()?,
            xpath: cur.read_utf8()?,
            typ: IndexType::from_byte(cur.read_u8()?)?,
        });
    }

    let doc_count = cur.read_u32()?;
    let mut doc_ids = Vec::with_capacity(doc_count as usize);
    for _ in 0..doc_count {
        let doc_id = ObjectId(cur.read_u32()?);
        let doc_name = cur.read_utf8()?;
        let media_type = MediaType::from_byte(cur.read_u8()?)?;
        let length = cur.read_u32()? as u64;
        let stored_length = cur.read_u32()? as u64;
        let created = cur.read_i64()?;
        let modified = cur.read_i64()?;
        let key_count = cur.read_u32()?;
        let mut keys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            let key_name = cur.read_utf8()?;
            let typ = IndexType::from_byte(cur.read_u8()?)?;
            let value = TypedValue::decode_from(typ, cur)?;
            keys.push((key_name, value));
        }
        documents.insert(
            doc_id,
            Document {
                id: doc_id,
                name: doc_name,
                parent_id: id,
                media_type,
                length,
                stored_length,
                created,
                modified,
                keys,
            },
        );
        doc_ids.push(doc_id);
    }

    let sub_count = cur.read_u32()?;
    let mut children = Vec::with_capacity(sub_count as usize);
    for _ in 0..sub_count {
        children.push(decode_collection(cur, Some(id), collections, documents)?);
    }

    collections.insert(
        id,
        Collection {
            id,
            name,
            parent_id,
            validation,
            compression,
            index_defs,
            children,
            documents: doc_ids,
        },
    );
    Ok(id)
}

fn decode_tree(bytes: &[u8]) -> Result<Tree> {
    let mut cur = Cursor::new(bytes);
    let mut collections = HashMap::new();
    let mut documents = HashMap::new();
    let root_id = decode_collection(&mut cur, None, &mut collections, &mut documents)?;
    Ok(Tree {
        collections,
        documents,
        root_id,
    })
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;
