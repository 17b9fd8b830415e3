use std::io::Read;

use super::*;
use crate::catalog::{Catalog, Resolved};
use crate::error::Error;
use crate::types::MediaType;

// A minimal stand-in verifying the traits are object-safe and
// composable over a real catalog, the way `Database` uses them.
struct StubSource<'a> {
    catalog: &'a Catalog,
}

impl<'a> CollectionSource for StubSource<'a> {
    fn collection_meta(&self, id: ObjectId) -> Result<Collection> {
        self.catalog.collection(id)
    }

    fn resolve(&self, uri: &str) -> Result<ObjectId> {
        match self.catalog.resolve_uri(uri)? {
            Resolved::Collection(id) => Ok(id),
            Resolved::Document(_) => Err(Error::invalid_argument("not a collection")),
        }
    }

    fn find_documents(
        &self,
        _collection_id: ObjectId,
        _keys: &[(String, TypedValue)],
        _recursive: bool,
    ) -> Result<Vec<ObjectId>> {
        Ok(Vec::new())
    }
}

impl<'a> DocumentSource for StubSource<'a> {
    fn document_meta(&self, id: ObjectId) -> Result<Document> {
        self.catalog.document(id)
    }

    fn open_document(&self, _id: ObjectId) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(std::io::empty()))
    }
}

#[test]
fn test_stub_resolves_through_the_trait_object() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    catalog.create_child_collection(root, "data").unwrap();
    let source = StubSource { catalog: &catalog };
    let source: &dyn CollectionSource = &source;
    let id = source.resolve("/data").unwrap();
    assert_eq!(source.collection_meta(id).unwrap().name, "data");
}

#[test]
fn test_document_source_is_object_safe() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    let doc = catalog
        .create_document(data, "a.xml", MediaType::Xml)
        .unwrap();
    let source = StubSource { catalog: &catalog };
    let source: &dyn DocumentSource = &source;
    assert_eq!(source.document_meta(doc).unwrap().name, "a.xml");
}
