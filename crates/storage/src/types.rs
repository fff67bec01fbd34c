//! Common types used across storage operations.
//!
//! [`ObjectInfo`] is what an object store reports about a single object;
//! [`KeyInfo`] is the same information expressed in terms of logical keys,
//! as returned by [`ObjectStorage::stat`](crate::ObjectStorage::stat).

use chrono::{DateTime, Utc};

/// Metadata an object store reports for one object.
///
/// # Examples
///
/// ```
/// use certstore_storage::ObjectInfo;
/// use chrono::Utc;
///
/// let info = ObjectInfo::new("acme/certs/example.com.crt", 1234, Utc::now());
/// assert_eq!(info.size, 1234);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object name within the bucket.
    pub name: String,

    /// Stored size in bytes (ciphertext size when encryption is enabled).
    pub size: u64,

    /// Last modification time reported by the store.
    pub modified: DateTime<Utc>,
}

impl ObjectInfo {
    /// Creates a new object description.
    pub fn new(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self { name: name.into(), size, modified }
    }
}

/// Metadata about a logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// The logical key as passed by the caller.
    pub key: String,

    /// Stored size in bytes.
    pub size: u64,

    /// Last modification time.
    pub modified: DateTime<Utc>,

    /// `true` for a file-like key, `false` for a directory-like prefix.
    /// Object stores only hold file-like keys.
    pub is_terminal: bool,
}

impl KeyInfo {
    /// Builds a terminal [`KeyInfo`] for `key` from the store's object metadata.
    pub fn from_object(key: impl Into<String>, info: ObjectInfo) -> Self {
        Self { key: key.into(), size: info.size, modified: info.modified, is_terminal: true }
    }
}
