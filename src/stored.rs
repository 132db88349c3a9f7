//! C6: walks each input segment's stored-docs region, drops tombstoned
//! docs, renumbers survivors, and produces the merged stored-docs region
//! plus its offset index (§4.2).

use std::{
    collections::BTreeMap,
    io::Write,
};

use byteorder::{
    BigEndian,
    WriteBytesExt,
};
use roaring::RoaringBitmap;

use crate::{
    fields::FieldUnifier,
    metrics,
    segment::{
        Segment,
        StoredFieldValue,
        StoredFieldVisitor,
    },
    varint::push_uvarint,
    writer::CountingHashingWriter,
};

/// Outcome of remapping one input segment's stored docs into the merged
/// output (§3 "DocNum remap table").
pub struct SegmentRemap {
    /// Entry `i` is the new docNum for input docNum `i`, or `DROPPED`.
    pub table: Vec<u64>,
}

/// Result of the whole stored-docs pass: every segment's remap table, the
/// total surviving doc count, and where the offset index begins.
pub struct StoredDocsResult {
    pub remaps: Vec<SegmentRemap>,
    pub new_doc_count: u64,
    pub stored_index_offset: u64,
}

struct BucketingVisitor<'a> {
    unifier: &'a FieldUnifier,
    by_field: BTreeMap<u32, Vec<StoredFieldValue>>,
}

impl<'a> StoredFieldVisitor for BucketingVisitor<'a> {
    fn visit(&mut self, value: StoredFieldValue) {
        if let Some(field_id) = self.unifier.field_id(&value.field) {
            self.by_field.entry(field_id).or_default().push(value);
        }
        // Fields absent from the merged inventory cannot occur: the
        // unifier's field list is the union of every input segment's
        // fields (§4.1).
    }
}

/// Writes one surviving doc's record in the slow-path layout: a varint
/// count of values, then per value `(fieldID, type, arrayPositionCount,
/// arrayPositions…, valueLen)`, followed by the snappy-compressed
/// concatenation of the raw value bytes (§3 "Stored field value
/// (supplemental)").
fn write_slow_doc<W: Write>(
    w: &mut CountingHashingWriter<W>,
    unifier: &FieldUnifier,
    segment: &dyn Segment,
    doc_num: u64,
) -> anyhow::Result<()> {
    let mut visitor = BucketingVisitor {
        unifier,
        by_field: BTreeMap::new(),
    };
    segment.visit_stored_doc(doc_num, &mut visitor)?;

    let mut meta = Vec::new();
    let mut raw_values = Vec::new();
    let mut count = 0u64;
    for (field_id, values) in &visitor.by_field {
        for v in values {
            push_uvarint(&mut meta, *field_id as u64);
            push_uvarint(&mut meta, v.typ as u64);
            push_uvarint(&mut meta, v.array_positions.len() as u64);
            for &p in &v.array_positions {
                push_uvarint(&mut meta, p);
            }
            push_uvarint(&mut meta, v.value.len() as u64);
            raw_values.extend_from_slice(&v.value);
            count += 1;
        }
    }

    let compressed = snap::raw::Encoder::new()
        .compress_vec(&raw_values)
        .map_err(|e| anyhow::anyhow!("snappy compression of stored doc {doc_num} failed: {e}"))?;

    let mut header = Vec::new();
    push_uvarint(&mut header, count);
    push_uvarint(&mut header, meta.len() as u64);
    push_uvarint(&mut header, compressed.len() as u64);

    w.write_all(&header)?;
    w.write_all(&meta)?;
    w.write_all(&compressed)?;
    Ok(())
}

/// Byte-copies one segment's entire stored region verbatim, used when
/// `fieldsSame` holds and the segment carries no tombstones (§4.2 "Fast
/// path"). Returns `None` when the segment offers no byte-backed region to
/// copy (e.g. a test double), in which case the caller must fall back to
/// the slow path.
fn try_fast_path_copy(segment: &dyn Segment) -> anyhow::Result<Option<(u64, u64, Vec<u64>)>> {
    let mem = segment.mem();
    if mem.is_empty() || segment.doc_count() == 0 {
        return Ok(None);
    }

    let (_, stored_offset_0, _, _, _) = segment.stored_offsets(0)?;
    let last = segment.doc_count() - 1;
    let (_, stored_offset_n, _, meta_len_n, data_len_n) = segment.stored_offsets(last)?;
    let region_end = stored_offset_n + meta_len_n + data_len_n;
    anyhow::ensure!(
        region_end as usize <= mem.len() && stored_offset_0 <= region_end,
        "segment reports a stored region outside its own byte slice"
    );

    let mut per_doc_old_offsets = Vec::with_capacity(segment.doc_count() as usize);
    for doc_num in 0..segment.doc_count() {
        let (_, stored_offset, _, _, _) = segment.stored_offsets(doc_num)?;
        per_doc_old_offsets.push(stored_offset);
    }

    Ok(Some((stored_offset_0, region_end, per_doc_old_offsets)))
}

/// Runs the full stored-docs pass over every input segment in order (§4.2).
pub fn remap_stored_docs<W: Write>(
    w: &mut CountingHashingWriter<W>,
    unifier: &FieldUnifier,
    segments: &[&dyn Segment],
    tombstones: &[RoaringBitmap],
) -> anyhow::Result<StoredDocsResult> {
    let _timer = metrics::stored_docs_remap_timer();
    anyhow::ensure!(
        segments.len() == tombstones.len(),
        "segments and tombstones length mismatch"
    );

    let mut remaps = Vec::with_capacity(segments.len());
    let mut cursor: u64 = 0;
    let mut new_offsets: Vec<u64> = Vec::new();

    for (segment, tomb) in segments.iter().zip(tombstones) {
        let doc_count = segment.doc_count();
        let mut table = vec![0u64; doc_count as usize];

        let can_fast_path = unifier.fields_same && tomb.is_empty();
        let fast = if can_fast_path {
            try_fast_path_copy(*segment)?
        } else {
            None
        };

        if let Some((old_region_start, old_region_end, per_doc_old_offsets)) = fast {
            metrics::log_stored_docs_fast_path();
            let new_region_start = w.bytes_written();
            let region_bytes = &segment.mem()[old_region_start as usize..old_region_end as usize];
            w.write_all(region_bytes)?;

            for doc_num in 0..doc_count {
                let new_doc_num = cursor;
                cursor += 1;
                table[doc_num as usize] = new_doc_num;
                let rebased =
                    per_doc_old_offsets[doc_num as usize] - old_region_start + new_region_start;
                if new_offsets.len() as u64 <= new_doc_num {
                    new_offsets.resize((new_doc_num + 1) as usize, 0);
                }
                new_offsets[new_doc_num as usize] = rebased;
            }
        } else {
            metrics::log_stored_docs_slow_path();
            for doc_num in 0..doc_count {
                if tomb.contains(doc_num as u32) {
                    table[doc_num as usize] = crate::segment::DROPPED;
                    continue;
                }
                let new_doc_num = cursor;
                cursor += 1;
                table[doc_num as usize] = new_doc_num;

                let offset = w.bytes_written();
                write_slow_doc(w, unifier, *segment, doc_num)?;
                if new_offsets.len() as u64 <= new_doc_num {
                    new_offsets.resize((new_doc_num + 1) as usize, 0);
                }
                new_offsets[new_doc_num as usize] = offset;
            }
        }

        remaps.push(SegmentRemap { table });
    }

    let new_doc_count = cursor;
    metrics::log_docs_kept(new_doc_count);
    let total_input: u64 = segments.iter().map(|s| s.doc_count()).sum();
    metrics::log_docs_dropped(total_input.saturating_sub(new_doc_count));

    let stored_index_offset = w.bytes_written();
    for &offset in &new_offsets {
        w.write_u64::<BigEndian>(offset)?;
    }

    Ok(StoredDocsResult {
        remaps,
        new_doc_count,
        stored_index_offset,
    })
}
