use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Names the family an [`Id`] belongs to.
pub trait IdKind: fmt::Debug + Clone + Copy + PartialEq + Eq + Hash {
    const PREFIX: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Document;

impl IdKind for Document {
    const PREFIX: &'static str = "doc";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conversation;

impl IdKind for Conversation {
    const PREFIX: &'static str = "ses";
}

/// A short identifier of the form `<prefix>-<8 hex digits>`.
///
/// The kind parameter keeps document and session ids from being mixed up
/// while sharing one representation on disk and on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<K: IdKind> {
    value: String,
    #[serde(skip)]
    kind: PhantomData<K>,
}

pub type DocId = Id<Document>;
pub type SessionId = Id<Conversation>;

impl<K: IdKind> Id<K> {
    pub fn generate() -> Self {
        Self::from_content(uuid::Uuid::new_v4().as_bytes())
    }

    /// Stable for identical input bytes.
    pub fn from_content(content: &[u8]) -> Self {
        let digest = blake3::hash(content);
        Self {
            value: format!("{}-{}", K::PREFIX, hex::encode(&digest.as_bytes()[..4])),
            kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K: IdKind> AsRef<str> for Id<K> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
