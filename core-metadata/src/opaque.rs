//! Raw chunks preserved for lossless re-serialization.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a preserved chunk: a four-char code or a Wave64 GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockId {
    FourCc([u8; 4]),
    Guid(Uuid),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::FourCc(code) => write!(f, "{}", String::from_utf8_lossy(code)),
            BlockId::Guid(guid) => write!(f, "{}", guid),
        }
    }
}

/// A chunk the parsers do not interpret, kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueBlock {
    id: BlockId,
    data: Bytes,
}

impl OpaqueBlock {
    pub fn new(id: BlockId, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
