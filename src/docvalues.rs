//! C8: accumulates per-doc term lists built during the postings merge and
//! emits a chunked doc-value column per field (§4.4 step 6).

use std::io::Write;

use crate::{
    chunked::ChunkedContentCoder,
    varint::push_uvarint,
    writer::CountingHashingWriter,
};

/// Writes one field's doc-value column: every non-empty `docTermMap` entry
/// fed to a chunked content coder, keyed by its docNum. Returns the byte
/// offset at which the column begins, or 0 if no document carried a term
/// for this field.
pub fn write_field_doc_values<W: Write>(
    w: &mut CountingHashingWriter<W>,
    doc_term_map: &[Vec<u8>],
    chunk_factor: u32,
) -> anyhow::Result<u64> {
    let mut coder = ChunkedContentCoder::new(chunk_factor);
    let mut any = false;
    for (doc_num, buf) in doc_term_map.iter().enumerate() {
        if buf.is_empty() {
            continue;
        }
        any = true;
        coder.add(doc_num as u64, buf);
    }
    if !any {
        return Ok(0);
    }
    let offset = w.bytes_written();
    let bytes = coder.close();
    w.write_all(&bytes)?;
    Ok(offset)
}

/// Writes the field doc-value locator table: `fieldsCount` varints giving
/// each field's doc-values offset, in inventory order. Returns the byte
/// offset the table starts at, recorded by the caller as the footer's
/// `docValueOffset` (§4.4 "After all fields", §4.7).
pub fn write_field_dv_locs<W: Write>(
    w: &mut CountingHashingWriter<W>,
    dv_offsets: &[u64],
) -> anyhow::Result<u64> {
    let offset = w.bytes_written();
    let mut scratch = Vec::new();
    for &o in dv_offsets {
        scratch.clear();
        push_uvarint(&mut scratch, o);
        w.write_all(&scratch)?;
    }
    Ok(offset)
}
