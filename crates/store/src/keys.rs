//! Key encoding for the records and latest namespaces
//!
//! A record key is `uid || '|' || big-endian-u64(revision)`. The
//! fixed-width big-endian suffix makes revisions of one object sort in
//! ascending numeric order, and the fixed suffix length makes the split
//! unambiguous: the uid is everything except the last nine bytes.

use retrace_core::{Error, Result, RevisionId};

/// Separator byte between uid and revision in a record key.
pub const SEPARATOR: u8 = b'|';

/// Length of the separator plus the big-endian revision suffix.
const SUFFIX_LEN: usize = 1 + 8;

/// Build the record key for `(uid, id)`.
pub fn record_key(uid: &str, id: RevisionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(uid.len() + SUFFIX_LEN);
    key.extend_from_slice(uid.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(&id.as_u64().to_be_bytes());
    key
}

/// Split a record key back into `(uid, revision)`.
pub fn split_record_key(key: &[u8]) -> Result<(&str, RevisionId)> {
    if key.len() <= SUFFIX_LEN {
        return Err(Error::Corruption(format!(
            "record key too short: {} bytes",
            key.len()
        )));
    }
    let (uid_bytes, suffix) = key.split_at(key.len() - SUFFIX_LEN);
    if suffix[0] != SEPARATOR {
        return Err(Error::Corruption(
            "record key missing separator".to_string(),
        ));
    }
    let uid = std::str::from_utf8(uid_bytes)
        .map_err(|_| Error::Corruption("record key uid is not utf-8".to_string()))?;
    let mut rev = [0u8; 8];
    rev.copy_from_slice(&suffix[1..]);
    Ok((uid, RevisionId::new(u64::from_be_bytes(rev))))
}
