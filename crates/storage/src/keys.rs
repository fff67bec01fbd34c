//! Mapping between logical keys and object names.
//!
//! Logical keys are the slash-separated paths handed to the storage facade
//! (`certificates/acme-v02/example.com/example.com.crt`). Object names are the
//! same paths placed under the configured prefix inside the bucket.
//!
//! All functions here are pure.

/// Suffix appended to an object name to form its lease object name.
pub const LOCK_SUFFIX: &str = ".lock";

/// Maps a logical key to its object name under `prefix`.
///
/// Leading and trailing `/` are stripped from both inputs. An empty prefix
/// (after trimming) places the key at the bucket root.
///
/// ```
/// use certstore_storage::keys::object_name;
///
/// assert_eq!(object_name("/acme/", "/certs/a.crt"), "acme/certs/a.crt");
/// assert_eq!(object_name("", "certs/a.crt"), "certs/a.crt");
/// ```
#[must_use]
pub fn object_name(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_matches('/');
    if prefix.is_empty() { key.to_owned() } else { format!("{prefix}/{key}") }
}

/// Name of the lease object guarding `key`.
#[must_use]
pub fn lock_name(prefix: &str, key: &str) -> String {
    let mut name = object_name(prefix, key);
    name.push_str(LOCK_SUFFIX);
    name
}

/// Object-name prefix to list for a logical `key_prefix`.
///
/// A non-empty logical prefix is treated as a directory and gains a trailing
/// `/`, so listing `certs` never matches `certs-old/...`. An empty logical
/// prefix lists everything under the storage root.
#[must_use]
pub fn list_prefix(prefix: &str, key_prefix: &str) -> String {
    let root = prefix.trim_matches('/');
    let key_prefix = key_prefix.trim_matches('/');
    match (root.is_empty(), key_prefix.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{key_prefix}/"),
        (false, true) => format!("{root}/"),
        (false, false) => format!("{root}/{key_prefix}/"),
    }
}

/// Strips the storage prefix from an object name, yielding the logical key.
///
/// Returns `None` when `name` is not below `prefix`. Trailing `/` (common
/// prefixes returned by non-recursive listings) is removed.
#[must_use]
pub fn to_logical(prefix: &str, name: &str) -> Option<String> {
    let root = prefix.trim_matches('/');
    let rest = if root.is_empty() {
        name
    } else {
        name.strip_prefix(root)?.strip_prefix('/')?
    };
    let logical = rest.trim_end_matches('/');
    if logical.is_empty() { None } else { Some(logical.to_owned()) }
}

/// Returns `true` if `name` is a lease object.
#[must_use]
pub fn is_lock_object(name: &str) -> bool {
    name.ends_with(LOCK_SUFFIX)
}
