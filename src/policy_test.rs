use super::*;
use crate::catalog::Catalog;
use crate::types::{IndexType, Mode};

#[test]
fn test_effective_validation_walks_to_explicit_ancestor() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    catalog
        .set_validation(root, Mode::Explicit(ValidationMode::On))
        .unwrap();
    let data = catalog.create_child_collection(root, "data").unwrap();
    let sub = catalog.create_child_collection(data, "sub").unwrap();

    assert_eq!(effective_validation(&catalog, sub).unwrap(), ValidationMode::On);

    catalog
        .set_validation(data, Mode::Explicit(ValidationMode::Auto))
        .unwrap();
    assert_eq!(effective_validation(&catalog, sub).unwrap(), ValidationMode::Auto);
}

#[test]
fn test_effective_compression_defaults_from_root() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    assert_eq!(effective_compression(&catalog, data).unwrap(), CompressionMode::None);

    catalog
        .set_compression(root, Mode::Explicit(CompressionMode::Deflate))
        .unwrap();
    assert_eq!(
        effective_compression(&catalog, data).unwrap(),
        CompressionMode::Deflate
    );
}

#[test]
fn test_effective_index_defs_unions_ancestor_chain() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    catalog
        .add_index_def(
            root,
            IndexDef {
                id: ObjectId(1000),
                name: "DocType".to_string(),
                xpath: "/*/Type".to_string(),
                typ: IndexType::String,
            },
        )
        .unwrap();
    let data = catalog.create_child_collection(root, "data").unwrap();
    catalog
        .add_index_def(
            data,
            IndexDef {
                id: ObjectId(1001),
                name: "Amount".to_string(),
                xpath: "/*/Amount".to_string(),
                typ: IndexType::Long,
            },
        )
        .unwrap();

    let mut names: Vec<_> = effective_index_defs(&catalog, data)
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Amount".to_string(), "DocType".to_string()]);
}

#[test]
fn test_explicit_mode_reports_inherit_without_resolving() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    assert!(matches!(explicit_validation(&catalog, data).unwrap(), Mode::Inherit));
}
