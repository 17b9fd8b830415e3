use super::*;

#[test]
fn test_default_root_synthesized_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.collection(catalog.root_id()).unwrap();
    assert_eq!(root.name, "db");
    assert_eq!(root.parent_id, None);
    assert!(matches!(root.validation, Mode::Explicit(ValidationMode::Off)));
}

#[test]
fn test_create_child_collection_and_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    let foo = catalog.create_child_collection(data, "foo").unwrap();

    match catalog.resolve_uri("/data/foo").unwrap() {
        Resolved::Collection(id) => assert_eq!(id, foo),
        _ => panic!("expected collection"),
    }
}

#[test]
fn test_create_document_and_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    let doc = catalog
        .create_document(data, "a.xml", MediaType::Xml)
        .unwrap();

    match catalog.resolve_uri("/data/a.xml").unwrap() {
        Resolved::Document(id) => assert_eq!(id, doc),
        _ => panic!("expected document"),
    }
}

#[test]
fn test_duplicate_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    catalog.create_child_collection(root, "data").unwrap();
    assert!(matches!(
        catalog.create_child_collection(root, "data"),
        Err(Error::NameInUse(_))
    ));
}

#[test]
fn test_delete_non_empty_requires_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    catalog
        .create_document(data, "a.xml", MediaType::Xml)
        .unwrap();

    assert!(matches!(
        catalog.delete_collection(data, false),
        Err(Error::InvalidState(_))
    ));
    catalog.delete_collection(data, true).unwrap();
    assert!(catalog.collection(data).is_err());
}

#[test]
fn test_delete_cascades_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    let foo = catalog.create_child_collection(data, "foo").unwrap();
    let doc = catalog
        .create_document(foo, "a.xml", MediaType::Xml)
        .unwrap();

    catalog.delete_collection(data, true).unwrap();
    assert!(catalog.collection(foo).is_err());
    assert!(catalog.document(doc).is_err());
}

// Scenario 1: persistence round-trip preserves the catalog
// and the nextId counter stays ahead of every minted id.
#[test]
fn test_persistence_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let doc_id;
    {
        let catalog = Catalog::open(dir.path()).unwrap();
        let root = catalog.root_id();
        let data = catalog.create_child_collection(root, "data").unwrap();
        let foo = catalog.create_child_collection(data, "foo").unwrap();
        doc_id = catalog
            .create_document(foo, "a.xml", MediaType::Xml)
            .unwrap();
        catalog
            .update_document_content(doc_id, 4, 4, vec![])
            .unwrap();
        catalog.persist(dir.path()).unwrap();
    }
    {
        let catalog = Catalog::open(dir.path()).unwrap();
        match catalog.resolve_uri("/data/foo/a.xml").unwrap() {
            Resolved::Document(id) => assert_eq!(id, doc_id),
            _ => panic!("expected document"),
        }
        assert!(catalog.next_id.load(Ordering::SeqCst) > doc_id.0);
    }
}

#[test]
fn test_update_document_content_rejects_duplicate_key_names() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let doc = catalog
        .create_document(root, "a.xml", MediaType::Xml)
        .unwrap();
    let keys = vec![
        ("DocType".to_string(), TypedValue::Str("invoice".to_string())),
        ("DocType".to_string(), TypedValue::Str("receipt".to_string())),
    ];
    assert!(matches!(
        catalog.update_document_content(doc, 4, 4, keys),
        Err(Error::NameInUse(_))
    ));
}

#[test]
fn test_index_def_inheritance_rejects_redefinition() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    catalog
        .add_index_def(
            data,
            IndexDef {
                id: ObjectId(1000),
                name: "DocType".to_string(),
                xpath: "/*/Type".to_string(),
                typ: IndexType::String,
            },
        )
        .unwrap();
    let child = catalog.create_child_collection(data, "sub").unwrap();
    assert!(matches!(
        catalog.add_index_def(
            child,
            IndexDef {
                id: ObjectId(1001),
                name: "DocType".to_string(),
                xpath: "/*/Other".to_string(),
                typ: IndexType::String,
            },
        ),
        Err(Error::NameInUse(_))
    ));
}

#[test]
fn test_root_validation_cannot_be_inherit() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    assert!(matches!(
        catalog.set_validation(root, Mode::Inherit),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_rename_checks_sibling_collision() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    catalog.create_child_collection(root, "data").unwrap();
    let other = catalog.create_child_collection(root, "other").unwrap();
    assert!(matches!(
        catalog.rename(Resolved::Collection(other), "data"),
        Err(Error::NameInUse(_))
    ));
}
