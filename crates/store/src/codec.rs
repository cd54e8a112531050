//! Record codec: type tag + MessagePack body
//!
//! A stored value is one tag byte identifying the record kind followed by
//! the MessagePack encoding of the record. Bodies are encoded as maps with
//! the one-byte field names declared on the record structs, so the format
//! stays self-describing while keeping per-revision overhead small.

use retrace_core::{Error, Record, Result};

/// Tag byte for snapshot records.
pub const TAG_SNAPSHOT: u8 = 0x01;
/// Tag byte for patch records.
pub const TAG_PATCH: u8 = 0x02;

/// Encode a record into its stored form.
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let (tag, body) = match record {
        Record::Snapshot(snapshot) => (
            TAG_SNAPSHOT,
            rmp_serde::to_vec_named(snapshot).map_err(Error::serialization)?,
        ),
        Record::Patch(patch) => (
            TAG_PATCH,
            rmp_serde::to_vec_named(patch).map_err(Error::serialization)?,
        ),
    };
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a stored value back into a record.
///
/// An unknown tag or an unparseable body is `InvalidRevision`: the record
/// exists but cannot be interpreted, which is corruption from the caller's
/// point of view.
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    let Some((&tag, body)) = bytes.split_first() else {
        return Err(Error::InvalidRevision("empty record value".to_string()));
    };
    match tag {
        TAG_SNAPSHOT => rmp_serde::from_slice(body)
            .map(Record::Snapshot)
            .map_err(|e| Error::InvalidRevision(format!("snapshot body: {e}"))),
        TAG_PATCH => rmp_serde::from_slice(body)
            .map(Record::Patch)
            .map_err(|e| Error::InvalidRevision(format!("patch body: {e}"))),
        other => Err(Error::InvalidRevision(format!(
            "unknown record tag {other:#04x}"
        ))),
    }
}
