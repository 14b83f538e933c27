//! Turns raw listing entries into the logical mapping the watcher tracks.
//!
//! A raw key is `<root>/<relative key>`; a raw value is the store's base64
//! wire form. Both directions live here so the in-memory store and the
//! watcher agree on the encoding.


use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::trace;

use crate::DecodeError;
use crate::KvEntry;
use crate::Result;

/// Relative key -> decoded value.
pub type KvMap = HashMap<String, String>;

/// Separator between the watched root and the relative key.
pub const KEY_SEPARATOR: char = '/';

/// Strips `root` and exactly one separator from the front of `raw_key`.
pub fn relative_key<'a>(
    root: &str,
    raw_key: &'a str,
) -> Result<&'a str> {
    raw_key
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
        .ok_or_else(|| {
            DecodeError::KeyOutsidePrefix {
                key: raw_key.to_string(),
                root: root.to_string(),
            }
            .into()
        })
}

/// Decodes a wire value into its logical string, trimming trailing whitespace.
/// A key stored without a value decodes to the empty string.
pub fn decode_value(
    key: &str,
    raw_value: Option<&str>,
) -> Result<String> {
    let Some(raw) = raw_value else {
        return Ok(String::new());
    };

    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|source| DecodeError::InvalidEncoding {
            key: key.to_string(),
            source,
        })?;
    let mut value = String::from_utf8(bytes).map_err(|source| DecodeError::InvalidUtf8 {
        key: key.to_string(),
        source,
    })?;

    value.truncate(value.trim_end().len());
    Ok(value)
}

/// Encodes a logical value into the store's wire form.
pub fn encode_value(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Decodes a whole listing. Fails on the first bad entry: a partially
/// decoded mapping is never returned.
///
/// The folder marker `<root>/` (empty relative key) is skipped. When a key
/// appears twice the later entry wins.
pub fn decode_listing(
    root: &str,
    entries: &[KvEntry],
) -> Result<KvMap> {
    let mut mapping = KvMap::with_capacity(entries.len());

    for entry in entries {
        let key = relative_key(root, &entry.key)?;
        if key.is_empty() {
            trace!(key = %entry.key, "skipping folder marker");
            continue;
        }
        let value = decode_value(&entry.key, entry.value.as_deref())?;
        mapping.insert(key.to_string(), value);
    }

    Ok(mapping)
}
