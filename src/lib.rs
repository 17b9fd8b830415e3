//! Xantippe is an embedded document database: a block-packed file
//! store, a hierarchical collection/document namespace with policy
//! inheritance, and a secondary index, all guarded by a reentrant
//! hierarchical read/write lock manager.
//!
//! [`Database`] is the entry point. It owns no query language of its
//! own; [`query`] defines the trait seam an embedding application
//! plugs a query engine into.
//!
//! ```no_run
//! use xantippe::{Database, DatabaseConfig, MediaType};
//!
//! let db = Database::new(DatabaseConfig::new("/tmp/xantippe-example"));
//! db.start()?;
//! let conn = db.connect();
//! conn.create_document("/db", "hello.txt", MediaType::Text, b"hi", vec![])?;
//! db.shutdown()?;
//! # Ok::<(), xantippe::Error>(())
//! ```

mod catalog;
mod codec;
mod database;
mod error;
mod index;
mod lock;
mod policy;
pub mod query;
mod store;
mod stream;
mod types;
mod util;

pub use crate::catalog::{Collection, Document, IndexDef, Resolved};
pub use crate::database::{Connection, Database, DatabaseConfig, DatabaseManager};
pub use crate::error::{Error, Result};
pub use crate::lock::Holder;
pub use crate::types::{
    CompressionMode, ExplicitCompression, ExplicitValidation, IndexType, MediaType, Mode, ObjectId, TypedValue,
    ValidationMode,
};
