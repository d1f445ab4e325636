//! Write operations grouped into a batch.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single operation inside a batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOp {
    Put { key: Bytes, value: Bytes },
    Del { key: Bytes },
}

impl BatchOp {
    /// Writes `value` under `key`.
    #[must_use]
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Deletes `key`.
    #[must_use]
    pub fn del(key: impl Into<Bytes>) -> Self {
        Self::Del { key: key.into() }
    }

    /// The key the operation addresses.
    #[must_use]
    pub fn key(&self) -> &Bytes {
        match self {
            Self::Put { key, .. } | Self::Del { key } => key,
        }
    }

    /// Returns the same operation addressed to `key`.
    ///
    /// Used to move an operation between global and local key coordinates.
    #[must_use]
    pub fn with_key(self, key: Bytes) -> Self {
        match self {
            Self::Put { value, .. } => Self::Put { key, value },
            Self::Del { .. } => Self::Del { key },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_key_keeps_kind_and_value() {
        let op = BatchOp::put("!mount!ee", "ff").with_key(Bytes::from_static(b"ee"));
        assert_eq!(op, BatchOp::put("ee", "ff"));

        let op = BatchOp::del("!mount!ee").with_key(Bytes::from_static(b"ee"));
        assert_eq!(op, BatchOp::del("ee"));
    }

    #[test]
    fn deserializes_tagged_operations() {
        let ops: Vec<BatchOp> = serde_json::from_str(
            r#"[{"type": "put", "key": "aa", "value": "bb"}, {"type": "del", "key": "cc"}]"#,
        )
        .unwrap();
        assert_eq!(ops, vec![BatchOp::put("aa", "bb"), BatchOp::del("cc")]);
        assert_eq!(ops[1].key(), &Bytes::from_static(b"cc"));
    }
}
