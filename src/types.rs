//! Core value types shared across the catalog, store and index.

use std::convert::TryInto;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// A monotonically increasing identifier for collections and documents.
///
/// Minted from the catalog's persisted `nextId` counter; never reused
/// within a database lifetime.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const ROOT_PARENT: i64 = -1;

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(buf: [u8; 4]) -> ObjectId {
        ObjectId(u32::from_be_bytes(buf))
    }
}

impl From<u32> for ObjectId {
    fn from(n: u32) -> ObjectId {
        ObjectId(n)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A three-valued inheritance switch used for validation and
/// compression policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode<T> {
    Inherit,
    Explicit(T),
}

/// Document validation policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    Off,
    On,
    Auto,
}

impl ValidationMode {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ValidationMode::Off => 0,
            ValidationMode::On => 1,
            ValidationMode::Auto => 2,
        }
    }
}

/// `validationMode` as stored on a collection: either one of the three
/// concrete modes, or `INHERIT`.
pub type ExplicitValidation = Mode<ValidationMode>;

impl ExplicitValidation {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Mode::Inherit => 3,
            Mode::Explicit(m) => m.to_byte(),
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<ExplicitValidation> {
        match b {
            0 => Ok(Mode::Explicit(ValidationMode::Off)),
            1 => Ok(Mode::Explicit(ValidationMode::On)),
            2 => Ok(Mode::Explicit(ValidationMode::Auto)),
            3 => Ok(Mode::Inherit),
            b => Err(Error::invalid_argument(format!(
                "unknown validation mode byte {}",
                b
            ))),
        }
    }
}

/// Document compression policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionMode {
    None,
    Deflate,
}

impl CompressionMode {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            CompressionMode::None => 0,
            CompressionMode::Deflate => 1,
        }
    }
}

/// `compressionMode` as stored on a collection: either one of the
/// concrete modes, or `INHERIT`.
pub type ExplicitCompression = Mode<CompressionMode>;

impl ExplicitCompression {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Mode::Inherit => 2,
            Mode::Explicit(m) => m.to_byte(),
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<ExplicitCompression> {
        match b {
            0 => Ok(Mode::Explicit(CompressionMode::None)),
            1 => Ok(Mode::Explicit(CompressionMode::Deflate)),
            2 => Ok(Mode::Inherit),
            b => Err(Error::invalid_argument(format!(
                "unknown compression mode byte {}",
                b
            ))),
        }
    }
}

/// The type tag of a secondary index definition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexType {
    String,
    Int,
    Long,
    Float,
    Double,
    Date,
}

impl IndexType {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            IndexType::String => 0,
            IndexType::Int => 1,
            IndexType::Long => 2,
            IndexType::Float => 3,
            IndexType::Double => 4,
            IndexType::Date => 5,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<IndexType> {
        match b {
            0 => Ok(IndexType::String),
            1 => Ok(IndexType::Int),
            2 => Ok(IndexType::Long),
            3 => Ok(IndexType::Float),
            4 => Ok(IndexType::Double),
            5 => Ok(IndexType::Date),
            b => Err(Error::invalid_argument(format!(
                "unknown index type byte {}",
                b
            ))),
        }
    }
}

/// A type-coerced secondary-index value.
///
/// Equality/ordering follow the type-appropriate equivalence: floats
/// compare by bit pattern so that `TypedValue` can live in an ordered
/// map without relying on `Ord` for `f64`/`f32`.
#[derive(Clone, Debug)]
pub enum TypedValue {
    Str(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(i64),
}

impl TypedValue {
    pub fn index_type(&self) -> IndexType {
        match self {
            TypedValue::Str(_) => IndexType::String,
            TypedValue::Int(_) => IndexType::Int,
            TypedValue::Long(_) => IndexType::Long,
            TypedValue::Float(_) => IndexType::Float,
            TypedValue::Double(_) => IndexType::Double,
            TypedValue::Date(_) => IndexType::Date,
        }
    }

    /// Coerce a raw string (e.g. extracted from an XML element) into a
    /// typed value per `typ`. Returns `None` on coercion failure, which
    /// the caller turns into a dropped-entry diagnostic.
    pub fn coerce(typ: IndexType, raw: &str) -> Option<TypedValue> {
        match typ {
            IndexType::String => Some(TypedValue::Str(raw.to_string())),
            IndexType::Int => raw.parse::<i32>().ok().map(TypedValue::Int),
            IndexType::Long => raw.parse::<i64>().ok().map(TypedValue::Long),
            IndexType::Float => raw.parse::<f32>().ok().map(TypedValue::Float),
            IndexType::Double => raw.parse::<f64>().ok().map(TypedValue::Double),
            IndexType::Date => raw.parse::<i64>().ok().map(TypedValue::Date),
        }
    }

    pub(crate) fn sort_key(&self) -> TypedValueKey {
        match self {
            TypedValue::Str(s) => TypedValueKey::Str(s.clone()),
            TypedValue::Int(n) => TypedValueKey::Long(*n as i64),
            TypedValue::Long(n) => TypedValueKey::Long(*n),
            TypedValue::Float(f) => TypedValueKey::Bits(f.to_bits() as u64),
            TypedValue::Double(f) => TypedValueKey::Bits(f.to_bits()),
            TypedValue::Date(d) => TypedValueKey::Long(*d),
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            TypedValue::Str(s) => {
                let bytes = s.as_bytes();
                let len: u32 = bytes.len().try_into().unwrap();
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(bytes);
            }
            TypedValue::Int(n) => buf.extend_from_slice(&n.to_be_bytes()),
            TypedValue::Long(n) => buf.extend_from_slice(&n.to_be_bytes()),
            TypedValue::Float(f) => buf.extend_from_slice(&f.to_be_bytes()),
            TypedValue::Double(f) => buf.extend_from_slice(&f.to_be_bytes()),
            TypedValue::Date(d) => buf.extend_from_slice(&d.to_be_bytes()),
        }
    }

    /// Decode a value of type `typ` from `cur`, advancing it by exactly
    /// the bytes consumed. Used both for the catalog's document-key
    /// sections and for `indices.dbx`'s per-value sections.
    pub(crate) fn decode_from(typ: IndexType, cur: &mut crate::util::Cursor) -> Result<TypedValue> {
        match typ {
            IndexType::String => Ok(TypedValue::Str(cur.read_utf8()?)),
            IndexType::Int => Ok(TypedValue::Int(cur.read_u32()? as i32)),
            IndexType::Long => Ok(TypedValue::Long(cur.read_i64()?)),
            IndexType::Date => Ok(TypedValue::Date(cur.read_i64()?)),
            IndexType::Float => {
                let bits = cur.read_u32()?;
                Ok(TypedValue::Float(f32::from_bits(bits)))
            }
            IndexType::Double => {
                let bits = cur.read_u64()?;
                Ok(TypedValue::Double(f64::from_bits(bits)))
            }
        }
    }
}

/// A hashable/orderable projection of [`TypedValue`], used as the inner
/// map key of the secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum TypedValueKey {
    Str(String),
    Long(i64),
    Bits(u64),
}

/// Media type of a document's bytes. Detection by file extension is explicitly out of
/// scope; callers supply this at write time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MediaType {
    Xml,
    Schema,
    Text,
    Binary,
}

impl MediaType {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            MediaType::Xml => 0,
            MediaType::Schema => 1,
            MediaType::Text => 2,
            MediaType::Binary => 3,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<MediaType> {
        match b {
            0 => Ok(MediaType::Xml),
            1 => Ok(MediaType::Schema),
            2 => Ok(MediaType::Text),
            3 => Ok(MediaType::Binary),
            b => Err(Error::invalid_argument(format!(
                "unknown media type byte {}",
                b
            ))),
        }
    }
}

/// Milliseconds since the Unix epoch, used for `created`/`modified`.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
