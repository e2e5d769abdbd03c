//! Image assets.
//!
//! An [`ImageAsset`] wraps one named firmware blob. Its size and SHA-1
//! content hash are derived from the bytes; the hash is computed on first use
//! and cached for the lifetime of the asset.

use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Length of a SHA-1 digest in bytes.
const HASH_LEN: usize = 20;

/// SHA-1 digest of an image's content.
///
/// Rendered as 40 lowercase hex characters, which is what the device-side
/// patch applier parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Hash a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Immutable named binary image.
///
/// Two assets are considered the same content iff their hashes match; raw
/// bytes are never compared directly once hashed.
#[derive(Clone)]
pub struct ImageAsset {
    name: String,
    bytes: Bytes,
    hash: OnceLock<ContentHash>,
}

impl ImageAsset {
    /// Create an asset from its logical name and content.
    ///
    /// `name` is the member name used in the output package (for example
    /// `radio.img`), not a filesystem path.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            hash: OnceLock::new(),
        }
    }

    /// Logical name of the image.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image content.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// SHA-1 of the content, computed once.
    pub fn content_hash(&self) -> ContentHash {
        *self.hash.get_or_init(|| ContentHash::of(&self.bytes))
    }

    /// Whether `other` carries the same content.
    pub fn same_content(&self, other: &ImageAsset) -> bool {
        self.content_hash() == other.content_hash()
    }

    /// Member name under which a patch for this image is stored.
    pub fn patch_name(&self) -> String {
        format!("{}.p", self.name)
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("hash", &self.hash.get().map(ContentHash::to_hex))
            .finish()
    }
}
