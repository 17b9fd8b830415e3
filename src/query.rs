//! The pluggable query-engine seam.
//!
//! Xantippe does not ship a query language; it exposes the catalog,
//! document bytes and secondary index through a small set of traits so
//! an external query engine (XPath, XQuery, whatever) can be plugged
//! in without this crate depending on it. [`crate::database::Database`]
//! is the only type that implements these.

use std::io::Read;

use crate::catalog::{Collection, Document};
use crate::error::Result;
use crate::types::{ObjectId, TypedValue};

/// Read access to a single document's metadata and bytes, without
/// exposing how or where those bytes are stored.
pub trait DocumentSource {
    fn document_meta(&self, id: ObjectId) -> Result<Document>;

    /// Open a fresh, independently-positioned read over the document's
    /// logical (decompressed) content.
    fn open_document(&self, id: ObjectId) -> Result<Box<dyn Read + '_>>;
}

/// Read access to the namespace tree, mirroring the subset of
/// [`crate::catalog::Catalog`] a query engine needs without granting
/// it write access.
pub trait CollectionSource {
    fn collection_meta(&self, id: ObjectId) -> Result<Collection>;

    fn resolve(&self, uri: &str) -> Result<ObjectId>;

    /// Conjunctive secondary-index lookup, optionally descending into
    /// child collections.
    fn find_documents(
        &self,
        collection_id: ObjectId,
        keys: &[(String, TypedValue)],
        recursive: bool,
    ) -> Result<Vec<ObjectId>>;
}

/// Resolves a module namespace to source text, for query engines that
/// support library modules (e.g. XQuery's `import module`).
/// `location_hints` are tried in order; the first one that resolves to
/// a stored document wins. A hint prefixed with `file:` has the prefix
/// stripped before being treated as a document URI.
pub trait ModuleResolver {
    fn resolve_module(&self, namespace_uri: &str, location_hints: &[&str]) -> Result<String>;
}

/// Strip a leading `file:` prefix from a module location hint. Hints
/// without the prefix pass through unchanged.
pub fn strip_file_prefix(hint: &str) -> &str {
    hint.strip_prefix("file:").unwrap_or(hint)
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
