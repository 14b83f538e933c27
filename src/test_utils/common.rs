use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::encode_value;
use crate::Cursor;
use crate::KvEntry;
use crate::Listing;

pub(crate) const ROOT: &str = "my-app/config";

pub(crate) fn random_ascii(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Entry under [`ROOT`] holding `value` in wire form.
pub(crate) fn entry(
    relative_key: &str,
    value: &str,
) -> KvEntry {
    KvEntry {
        key: format!("{ROOT}/{relative_key}"),
        value: Some(encode_value(value)),
        create_index: rand::thread_rng().gen_range(0..100),
        modify_index: rand::thread_rng().gen_range(0..100),
        flags: 0,
    }
}

/// Entry with a random 10 character key and value.
pub(crate) fn random_entry() -> KvEntry {
    entry(&random_ascii(10), &random_ascii(10))
}

/// Between 1 and 5 random entries.
pub(crate) fn random_entries() -> Vec<KvEntry> {
    let count = rand::thread_rng().gen_range(1..=5);
    (0..count).map(|_| random_entry()).collect()
}

pub(crate) fn listing(
    entries: Vec<KvEntry>,
    index: Cursor,
) -> Listing {
    Listing::new(entries, index)
}

pub(crate) fn relative(entry: &KvEntry) -> String {
    entry.key[ROOT.len() + 1..].to_string()
}

pub(crate) fn logical(entry: &KvEntry) -> String {
    crate::decode_value(&entry.key, entry.value.as_deref()).unwrap()
}
