//! C9: the merged fields index and the fixed-layout footer (§4.7).

use std::io::Write;

use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::{
    varint::{
        push_uvarint,
        read_uvarint_from_slice,
    },
    writer::CountingHashingWriter,
};

/// Sentinel `docValueOffset` recorded when `newDocCount == 0` (§4.7).
pub const FIELD_NOT_UNINVERTED: u64 = u64::MAX;

/// `numDocs, storedIndexOffset, fieldsIndexOffset, docValueOffset,
/// chunkFactor, checksum32` (§4.7), little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub num_docs: u64,
    pub stored_index_offset: u64,
    pub fields_index_offset: u64,
    pub doc_value_offset: u64,
    pub chunk_factor: u32,
    pub checksum: u32,
}

/// Fixed on-disk width of the footer, used by callers to size their final
/// read.
pub const FOOTER_LEN: usize = 8 * 4 + 4 + 4;

/// Writes the fields index: for each field in inventory order, its
/// length-prefixed name and varint dictionary offset. Returns the offset
/// at which the index began.
pub fn write_fields_index<W: Write>(
    w: &mut CountingHashingWriter<W>,
    fields: &[String],
    dict_offsets: &[u64],
) -> anyhow::Result<u64> {
    anyhow::ensure!(
        fields.len() == dict_offsets.len(),
        "fields and dict_offsets length mismatch"
    );
    let fields_index_offset = w.bytes_written();
    let mut scratch = Vec::new();
    for (name, &offset) in fields.iter().zip(dict_offsets) {
        scratch.clear();
        push_uvarint(&mut scratch, name.len() as u64);
        w.write_all(&scratch)?;
        w.write_all(name.as_bytes())?;
        scratch.clear();
        push_uvarint(&mut scratch, offset);
        w.write_all(&scratch)?;
    }
    Ok(fields_index_offset)
}

/// Writes the fixed footer. Must be the very last thing written: the
/// checksum covers every byte written before this call.
pub fn write_footer<W: Write>(
    w: &mut CountingHashingWriter<W>,
    num_docs: u64,
    stored_index_offset: u64,
    fields_index_offset: u64,
    doc_value_offset: u64,
    chunk_factor: u32,
) -> anyhow::Result<()> {
    w.write_u64::<LittleEndian>(num_docs)?;
    w.write_u64::<LittleEndian>(stored_index_offset)?;
    w.write_u64::<LittleEndian>(fields_index_offset)?;
    w.write_u64::<LittleEndian>(doc_value_offset)?;
    w.write_u32::<LittleEndian>(chunk_factor)?;
    let checksum = w.checksum();
    w.write_u32::<LittleEndian>(checksum)?;
    Ok(())
}

/// Parses the trailing `FOOTER_LEN` bytes of a merged segment. Used by
/// round-trip tests (§8); a full segment reader is out of scope (§1).
pub fn read_footer(bytes: &[u8]) -> anyhow::Result<Footer> {
    anyhow::ensure!(
        bytes.len() >= FOOTER_LEN,
        "segment too small to contain a footer"
    );
    let footer_bytes = &bytes[bytes.len() - FOOTER_LEN..];
    let mut r = footer_bytes;
    let num_docs = r.read_u64::<LittleEndian>()?;
    let stored_index_offset = r.read_u64::<LittleEndian>()?;
    let fields_index_offset = r.read_u64::<LittleEndian>()?;
    let doc_value_offset = r.read_u64::<LittleEndian>()?;
    let chunk_factor = r.read_u32::<LittleEndian>()?;
    let checksum = r.read_u32::<LittleEndian>()?;

    let preceding = &bytes[..bytes.len() - 4];
    let computed: u32 = preceding
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32));
    anyhow::ensure!(
        computed == checksum,
        "footer checksum mismatch: expected {checksum}, computed {computed}"
    );

    Ok(Footer {
        num_docs,
        stored_index_offset,
        fields_index_offset,
        doc_value_offset,
        chunk_factor,
        checksum,
    })
}

/// Parses the length-prefixed `(name, dict_offset)` entries of a fields
/// index written by `write_fields_index`, given its starting offset and
/// the number of fields expected.
pub fn read_fields_index(
    bytes: &[u8],
    fields_index_offset: u64,
    num_fields: usize,
) -> anyhow::Result<Vec<(String, u64)>> {
    let mut pos = fields_index_offset as usize;
    let mut out = Vec::with_capacity(num_fields);
    for _ in 0..num_fields {
        let (name_len, n) = read_uvarint_from_slice(&bytes[pos..])?;
        pos += n;
        let name = String::from_utf8(bytes[pos..pos + name_len as usize].to_vec())?;
        pos += name_len as usize;
        let (offset, n) = read_uvarint_from_slice(&bytes[pos..])?;
        pos += n;
        out.push((name, offset));
    }
    Ok(out)
}
