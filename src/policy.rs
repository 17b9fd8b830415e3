//! Resolves the three-valued validation/compression switches and the
//! additive index-definition inheritance walk.
//!
//! The catalog stores each collection's own setting (possibly
//! `INHERIT`); this module is the only place that walks the ancestor
//! chain to turn that into an effective value. It never mutates the
//! catalog.

use std::collections::HashMap;

use crate::catalog::{Catalog, IndexDef};
use crate::error::Result;
use crate::types::{CompressionMode, ExplicitCompression, ExplicitValidation, Mode, ObjectId, ValidationMode};

/// Walk from `id` towards the root, returning the first explicit
/// validation mode found. The root is never `INHERIT` (enforced by
/// [`Catalog::set_validation`]), so this always terminates.
pub fn effective_validation(catalog: &Catalog, id: ObjectId) -> Result<ValidationMode> {
    for cid in catalog.ancestors(id)? {
        match catalog.collection(cid)?.validation {
            Mode::Explicit(mode) => return Ok(mode),
            Mode::Inherit => continue,
        }
    }
    unreachable!("root collection always carries an explicit validation mode")
}

/// Walk from `id` towards the root, returning the first explicit
/// compression mode found.
pub fn effective_compression(catalog: &Catalog, id: ObjectId) -> Result<CompressionMode> {
    for cid in catalog.ancestors(id)? {
        match catalog.collection(cid)?.compression {
            Mode::Explicit(mode) => return Ok(mode),
            Mode::Inherit => continue,
        }
    }
    unreachable!("root collection always carries an explicit compression mode")
}

/// Whichever of `getExplicitMode`'s two flavors the caller wants,
/// exposed so a management surface can report "this collection
/// inherits" versus "this collection overrides" without resolving.
pub fn explicit_validation(catalog: &Catalog, id: ObjectId) -> Result<ExplicitValidation> {
    Ok(catalog.collection(id)?.validation)
}

pub fn explicit_compression(catalog: &Catalog, id: ObjectId) -> Result<ExplicitCompression> {
    Ok(catalog.collection(id)?.compression)
}

/// The union of `id`'s own index definitions with every ancestor's,
/// nearest-first. `add_index_def` already rejects same-name
/// redefinition anywhere in the chain, so this union never contains a
/// duplicate name; it exists purely to answer "what indexes apply
/// here", not to enforce the invariant.
pub fn effective_index_defs(catalog: &Catalog, id: ObjectId) -> Result<Vec<IndexDef>> {
    let mut seen = HashMap::new();
    for cid in catalog.ancestors(id)? {
        for def in catalog.collection(cid)?.index_defs {
            seen.entry(def.name.clone()).or_insert(def);
        }
    }
    Ok(seen.values().cloned().collect())
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod policy_test;
