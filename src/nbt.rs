//! Binary tag decoding: NBT save files into a plain [`Tree`].
//!
//! Parsing is delegated to `fastnbt`; this module only projects the parsed
//! value model into primitives, compounds, and lists. Tag kinds without a
//! primitive counterpart decode to [`Tree::Null`] instead of failing, so a
//! structurally valid file always decodes.

use std::collections::BTreeMap;
use std::io::Read;

use fastnbt::Value;
use flate2::read::GzDecoder;

/// Errors that can occur while turning raw bytes into a tree.
#[derive(Debug, thiserror::Error)]
pub enum NbtError {
    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("NBT error: {0}")]
    Parse(#[from] fastnbt::error::Error),
}

/// An untyped decoded tag tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    /// A tag kind with no primitive projection.
    Null,
    Byte(i8),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Tree>),
    Compound(BTreeMap<String, Tree>),
}

/// Gzip magic bytes. Minecraft player and world saves are gzipped.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Parse raw save bytes (gzipped or not) and decode them.
pub fn parse(bytes: &[u8]) -> Result<Tree, NbtError> {
    let value: Value = if bytes.starts_with(&GZIP_MAGIC) {
        let mut raw = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut raw)?;
        fastnbt::from_bytes(&raw)?
    } else {
        fastnbt::from_bytes(bytes)?
    };
    Ok(decode(&value))
}

/// Decode a parsed tag into a [`Tree`]. Total: never fails.
pub fn decode(value: &Value) -> Tree {
    match value {
        Value::Byte(b) => Tree::Byte(*b),
        Value::Int(i) => Tree::Int(i64::from(*i)),
        Value::Long(l) => Tree::Int(*l),
        Value::Float(f) => Tree::Float(f64::from(*f)),
        Value::Double(d) => Tree::Float(*d),
        Value::String(s) => Tree::String(s.clone()),
        Value::Compound(map) => Tree::Compound(
            map.iter()
                .map(|(key, child)| (key.clone(), decode(child)))
                .collect(),
        ),
        Value::List(items) => Tree::List(items.iter().map(decode).collect()),
        _ => Tree::Null,
    }
}

impl Tree {
    /// Child of a compound by key.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Self::Compound(map) => map.get(key),
            _ => None,
        }
    }

    /// Walk nested compounds by key.
    pub fn path(&self, keys: &[&str]) -> Option<&Tree> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of byte and int tags.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floating view of any numeric tag.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Byte(b) => Some(f64::from(*b)),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// NBT has no boolean tag; booleans are stored as bytes.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_i64().map(|v| v != 0)
    }

    pub fn as_list(&self) -> Option<&[Tree]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&BTreeMap<String, Tree>> {
        match self {
            Self::Compound(map) => Some(map),
            _ => None,
        }
    }
}
