//! C7: for each field, merges per-term postings across segments,
//! reassembling TF/norm/location streams under the new docNum space, with
//! a 1-hit encoding shortcut for singleton terms (§4.4).

use std::io::Write;

use roaring::RoaringBitmap;

use crate::{
    chunked::ChunkedIntCoder,
    dict_merge::DictionaryEnumerator,
    docvalues::{
        write_field_doc_values,
        write_field_dv_locs,
    },
    fields::FieldUnifier,
    metrics,
    segment::{
        encode_loc_entry,
        encode_tf_entry,
        Segment,
        DROPPED,
    },
    varint::{
        push_uvarint,
        read_uvarint_from_slice,
    },
    writer::CountingHashingWriter,
};

/// A reserved byte that never appears inside a term, used to separate
/// consecutive terms packed into one doc's `docTermMap` entry (§4.5).
pub const TERM_SEPARATOR: u8 = 0xFF;

/// High bit of a dictionary value that flags it as a 1-hit packed
/// `(docNum, normBits)` pair rather than a postings-record byte offset
/// (§4.4 step 5). The remaining 63 bits split into 31 bits of docNum
/// (`docNum < 2^31`) followed by the 32-bit norm bit pattern, which is
/// exactly enough room once the flag bit is reserved.
const ONE_HIT_FLAG: u64 = 1u64 << 63;

fn pack_one_hit(doc_num: u64, norm_bits: u32) -> u64 {
    ONE_HIT_FLAG | (doc_num << 32) | (norm_bits as u64)
}

/// Result of merging every field in the unified inventory: per-field
/// dictionary offsets and doc-value column offsets, both indexed by
/// `fieldID`, plus the doc-value locator table's own offset.
pub struct PostingsMergeResult {
    pub dict_offsets: Vec<u64>,
    pub doc_value_offsets: Vec<u64>,
    pub field_dv_locs_offset: u64,
}

struct FieldSource<'a> {
    segment: &'a dyn Segment,
    remap: &'a [u64],
    tombstones: &'a RoaringBitmap,
}

/// Decodes the leading `(freqWord, normBits)` pair out of a fast-path
/// encoded TF-chunk entry, needed to evaluate the 1-hit predicate without
/// re-deriving it from a parsed `Posting` (§4.4 step 5).
fn decode_tf_entry(tf_bytes: &[u8]) -> anyhow::Result<(u64, bool, u32)> {
    let (freq_word, n) = read_uvarint_from_slice(tf_bytes)?;
    let (norm_bits, _) = read_uvarint_from_slice(&tf_bytes[n..])?;
    Ok((freq_word >> 1, freq_word & 1 == 1, norm_bits as u32))
}

#[allow(clippy::too_many_arguments)]
fn merge_one_term(
    group: &[crate::dict_merge::TermEntry],
    sources: &[FieldSource<'_>],
    field: &str,
    bitmap: &mut RoaringBitmap,
    tf_coder: &mut ChunkedIntCoder,
    loc_coder: &mut ChunkedIntCoder,
    doc_term_map: &mut [Vec<u8>],
    fields_same: bool,
) -> anyhow::Result<(u64, bool, u32)> {
    let mut term_cardinality: u64 = 0;
    let mut last_doc_num: u64 = 0;
    let mut last_freq: u64 = 0;
    let mut last_norm: u32 = 0;

    for entry in group {
        let source = &sources[entry.source_index];
        let mut it = source
            .segment
            .postings_list(field, entry.postings_offset, source.tombstones)?;

        if fields_same {
            while let Some(chunk) = it.next_encoded()? {
                let new_doc_num = source.remap[chunk.doc_num as usize];
                anyhow::ensure!(
                    new_doc_num != DROPPED,
                    "saw hit with dropped docNum in field {field:?}"
                );
                let (freq, has_locs, norm_bits) = decode_tf_entry(&chunk.tf_bytes)?;

                bitmap.insert(new_doc_num as u32);
                tf_coder.add_encoded_bytes(new_doc_num, &chunk.tf_bytes);
                if !chunk.loc_bytes.is_empty() {
                    loc_coder.add_encoded_bytes(new_doc_num, &chunk.loc_bytes);
                }
                doc_term_map[new_doc_num as usize].extend_from_slice(&entry.term);
                doc_term_map[new_doc_num as usize].push(TERM_SEPARATOR);

                term_cardinality += 1;
                last_doc_num = new_doc_num;
                last_freq = freq;
                last_norm = norm_bits;
                let _ = has_locs;
            }
        } else {
            while let Some(posting) = it.next_posting()? {
                let new_doc_num = source.remap[posting.doc_num as usize];
                anyhow::ensure!(
                    new_doc_num != DROPPED,
                    "saw hit with dropped docNum in field {field:?}"
                );
                let has_locs = !posting.locations.is_empty();

                bitmap.insert(new_doc_num as u32);
                let tf_bytes = encode_tf_entry(posting.freq, has_locs, posting.norm_bits);
                tf_coder.add_encoded_bytes(new_doc_num, &tf_bytes);
                for loc in &posting.locations {
                    let loc_bytes = encode_loc_entry(loc);
                    loc_coder.add_encoded_bytes(new_doc_num, &loc_bytes);
                }
                doc_term_map[new_doc_num as usize].extend_from_slice(&entry.term);
                doc_term_map[new_doc_num as usize].push(TERM_SEPARATOR);

                term_cardinality += 1;
                last_doc_num = new_doc_num;
                last_freq = posting.freq;
                last_norm = posting.norm_bits;
            }
        }
    }

    if term_cardinality == 1 {
        // Open question (§9): redundant given cardinality 1 — bitmap.len()
        // and the independently tracked cardinality counter must agree, or
        // the accumulators have desynced.
        anyhow::ensure!(
            bitmap.len() == 1,
            "1-hit candidate has cardinality 1 but bitmap holds {} docs",
            bitmap.len()
        );
    }

    Ok((last_doc_num, term_cardinality == 1 && last_freq == 1, last_norm))
}

/// Serializes the accumulated bitmap/TF/loc state for one term and returns
/// the dictionary value to insert for it: 0 if nothing survived, a
/// 1-hit-packed value, or a real postings-record offset (§4.6).
fn write_postings<W: Write>(
    w: &mut CountingHashingWriter<W>,
    bitmap: &RoaringBitmap,
    tf_coder: &mut ChunkedIntCoder,
    loc_coder: &mut ChunkedIntCoder,
    one_hit_eligible: bool,
    one_hit_doc_num: u64,
    one_hit_norm_bits: u32,
) -> anyhow::Result<u64> {
    if bitmap.is_empty() {
        return Ok(0);
    }

    if one_hit_eligible && loc_coder.final_size() == 0 && one_hit_doc_num < (1u64 << 31) {
        metrics::log_one_hit_encoded();
        return Ok(pack_one_hit(one_hit_doc_num, one_hit_norm_bits));
    }

    let tf_offset = w.bytes_written();
    let tf_bytes = tf_coder.close();
    w.write_all(&tf_bytes)?;

    let loc_offset = w.bytes_written();
    let loc_bytes = loc_coder.close();
    w.write_all(&loc_bytes)?;

    let mut serialized_bitmap = Vec::new();
    bitmap.serialize_into(&mut serialized_bitmap)?;

    let postings_offset = w.bytes_written();
    let mut scratch = Vec::new();
    push_uvarint(&mut scratch, tf_offset);
    push_uvarint(&mut scratch, loc_offset);
    push_uvarint(&mut scratch, serialized_bitmap.len() as u64);
    w.write_all(&scratch)?;
    w.write_all(&serialized_bitmap)?;

    Ok(postings_offset)
}

/// Merges one field's postings across every segment that carries it,
/// writing its dictionary and doc-value column, and returns `(dict_offset,
/// doc_value_offset)`. Both are 0 when no surviving doc carries the field.
fn merge_field<W: Write>(
    w: &mut CountingHashingWriter<W>,
    field: &str,
    segments: &[&dyn Segment],
    remaps: &[Vec<u64>],
    tombstones: &[RoaringBitmap],
    fields_same: bool,
    chunk_factor: u32,
    doc_term_map: &mut [Vec<u8>],
) -> anyhow::Result<(u64, u64)> {
    let _timer = metrics::field_postings_merge_timer();
    for buf in doc_term_map.iter_mut() {
        buf.clear();
    }
    if fields_same {
        metrics::log_postings_fast_path();
    } else {
        metrics::log_postings_slow_path();
    }

    let mut sources = Vec::new();
    let mut iters = Vec::new();
    for (seg_idx, segment) in segments.iter().enumerate() {
        if let Some(dict) = segment.dictionary(field) {
            sources.push(FieldSource {
                segment: *segment,
                remap: &remaps[seg_idx],
                tombstones: &tombstones[seg_idx],
            });
            iters.push(dict.iter());
        }
    }

    if iters.is_empty() {
        let dv_offset = write_field_doc_values(w, doc_term_map, chunk_factor)?;
        return Ok((0, dv_offset));
    }

    let mut enumerator = DictionaryEnumerator::new(iters);
    let mut builder = fst::MapBuilder::memory();
    let mut inserted = 0u64;

    let mut bitmap = RoaringBitmap::new();
    let mut tf_coder = ChunkedIntCoder::new(chunk_factor);
    let mut loc_coder = ChunkedIntCoder::new(chunk_factor);

    loop {
        let group = enumerator.next_term_group();
        if group.is_empty() {
            break;
        }
        let term = group[0].term.clone();

        bitmap.clear();
        tf_coder.reset();
        loc_coder.reset();

        let (doc_num, one_hit_eligible, norm_bits) = merge_one_term(
            &group,
            &sources,
            field,
            &mut bitmap,
            &mut tf_coder,
            &mut loc_coder,
            doc_term_map,
            fields_same,
        )?;

        let value = write_postings(
            w,
            &bitmap,
            &mut tf_coder,
            &mut loc_coder,
            one_hit_eligible,
            doc_num,
            norm_bits,
        )?;
        if value != 0 {
            builder.insert(&term, value)?;
            inserted += 1;
        }
    }

    let dict_offset = if inserted == 0 {
        0
    } else {
        let offset = w.bytes_written();
        let fst_bytes = builder.into_inner()?;
        let mut scratch = Vec::new();
        push_uvarint(&mut scratch, fst_bytes.len() as u64);
        w.write_all(&scratch)?;
        w.write_all(&fst_bytes)?;
        offset
    };

    let dv_offset = write_field_doc_values(w, doc_term_map, chunk_factor)?;
    Ok((dict_offset, dv_offset))
}

/// Merges every field in the unified inventory, in order, and writes the
/// trailing doc-value locator table (§4.4 "After all fields").
pub fn merge_postings<W: Write>(
    w: &mut CountingHashingWriter<W>,
    unifier: &FieldUnifier,
    segments: &[&dyn Segment],
    remaps: &[Vec<u64>],
    tombstones: &[RoaringBitmap],
    new_doc_count: u64,
    chunk_factor: u32,
) -> anyhow::Result<PostingsMergeResult> {
    let mut dict_offsets = Vec::with_capacity(unifier.fields.len());
    let mut doc_value_offsets = Vec::with_capacity(unifier.fields.len());
    let mut doc_term_map = vec![Vec::new(); new_doc_count as usize];

    for field in &unifier.fields {
        let (dict_offset, dv_offset) = merge_field(
            w,
            field,
            segments,
            remaps,
            tombstones,
            unifier.fields_same,
            chunk_factor,
            &mut doc_term_map,
        )?;
        dict_offsets.push(dict_offset);
        doc_value_offsets.push(dv_offset);
    }

    let field_dv_locs_offset = write_field_dv_locs(w, &doc_value_offsets)?;

    Ok(PostingsMergeResult {
        dict_offsets,
        doc_value_offsets,
        field_dv_locs_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        segment::{
            Location,
            Posting,
            StoredFieldType,
            StoredFieldValue,
        },
        testutil::FakeSegment,
    };

    fn value(field: &str, term: &[u8]) -> StoredFieldValue {
        StoredFieldValue {
            field: field.to_string(),
            typ: StoredFieldType::Text,
            value: term.to_vec(),
            array_positions: vec![],
        }
    }

    #[test]
    fn single_term_single_doc_uses_one_hit_encoding() {
        let mut seg = FakeSegment::new(vec!["_id".into()]);
        seg.add_doc(vec![value("_id", b"a")]);
        seg.add_term(
            "_id",
            b"a",
            vec![Posting {
                doc_num: 0,
                freq: 1,
                norm_bits: 0,
                locations: vec![],
            }],
        );
        let refs: Vec<&dyn Segment> = vec![&seg];
        let unifier = FieldUnifier::compute(&refs).unwrap();
        let remaps = vec![vec![0u64]];
        let tombstones = vec![RoaringBitmap::new()];

        let mut w = CountingHashingWriter::new(Vec::new());
        let result =
            merge_postings(&mut w, &unifier, &refs, &remaps, &tombstones, 1, 16).unwrap();

        let id_field_pos = unifier.fields.iter().position(|f| f == "_id").unwrap();
        assert_ne!(result.dict_offsets[id_field_pos], 0);
        let bytes = w.into_inner();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn overlapping_term_with_locations_is_not_one_hit() {
        let mut seg_a = FakeSegment::new(vec!["_id".into(), "body".into()]);
        seg_a.add_doc(vec![value("_id", b"a")]);
        seg_a.add_term(
            "body",
            b"x",
            vec![Posting {
                doc_num: 0,
                freq: 2,
                norm_bits: 0,
                locations: vec![Location {
                    field_id: 1,
                    position: 0,
                    start: 0,
                    end: 1,
                    array_positions: vec![],
                }],
            }],
        );
        let mut seg_b = FakeSegment::new(vec!["_id".into(), "body".into()]);
        seg_b.add_doc(vec![value("_id", b"b")]);
        seg_b.add_term(
            "body",
            b"x",
            vec![Posting {
                doc_num: 0,
                freq: 1,
                norm_bits: 0,
                locations: vec![],
            }],
        );

        let refs: Vec<&dyn Segment> = vec![&seg_a, &seg_b];
        let unifier = FieldUnifier::compute(&refs).unwrap();
        let remaps = vec![vec![0u64], vec![1u64]];
        let tombstones = vec![RoaringBitmap::new(), RoaringBitmap::new()];

        let mut w = CountingHashingWriter::new(Vec::new());
        let result =
            merge_postings(&mut w, &unifier, &refs, &remaps, &tombstones, 2, 16).unwrap();

        let body_pos = unifier.fields.iter().position(|f| f == "body").unwrap();
        assert_ne!(result.dict_offsets[body_pos], 0);
    }

    #[test]
    fn dropped_docnum_in_postings_is_fatal() {
        let mut seg = FakeSegment::new(vec!["_id".into()]);
        seg.add_doc(vec![value("_id", b"a")]);
        seg.add_term(
            "_id",
            b"a",
            vec![Posting {
                doc_num: 0,
                freq: 1,
                norm_bits: 0,
                locations: vec![],
            }],
        );
        let refs: Vec<&dyn Segment> = vec![&seg];
        let unifier = FieldUnifier::compute(&refs).unwrap();
        let remaps = vec![vec![DROPPED]];
        let tombstones = vec![RoaringBitmap::new()];

        let mut w = CountingHashingWriter::new(Vec::new());
        let result = merge_postings(&mut w, &unifier, &refs, &remaps, &tombstones, 0, 16);
        assert!(result.is_err());
    }
}
