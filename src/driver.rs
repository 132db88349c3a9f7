//! C10: orchestrates Field Unifier → Stored-docs Remapper → Postings
//! Merger → Doc-values → Footer/Fields-index; wraps the output in a
//! counting/hashing writer and cleans up on failure (§2, §6 "Top-level
//! entry", §10).

use std::{
    fs,
    io::{
        BufWriter,
        Write,
    },
    path::Path,
};

use fastrace::{
    collector::SpanContext,
    Span,
};
use roaring::RoaringBitmap;

use crate::{
    fields::FieldUnifier,
    footer::{
        write_fields_index,
        write_footer,
        FIELD_NOT_UNINVERTED,
    },
    metrics::{
        self,
        MergePhase,
    },
    postings::merge_postings,
    segment::Segment,
    stored::remap_stored_docs,
    writer::CountingHashingWriter,
};

/// Explicit, non-environment tunables for a merge (§11).
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub output_buffer_size: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            output_buffer_size: 1024 * 1024,
        }
    }
}

/// What a successful merge hands back to its caller: each input segment's
/// remap table, in input order, and the final output file size (§6).
pub struct MergeOutcome {
    pub remaps: Vec<Vec<u64>>,
    pub new_doc_count: u64,
    pub file_size: u64,
}

/// Merges `segments` (with parallel `tombstones`, nullable entries
/// represented as empty bitmaps) into a single new segment at
/// `output_path`. On any error the partial output file is removed and the
/// error is returned; nothing is recovered locally (§7).
pub fn merge_segments(
    segments: &[&dyn Segment],
    tombstones: &[RoaringBitmap],
    output_path: &Path,
    chunk_factor: u32,
    options: &MergeOptions,
) -> anyhow::Result<MergeOutcome> {
    let _timer = metrics::merge_segments_timer();
    let root = Span::root("segment_merge::merge_segments", SpanContext::random());
    let _guard = root.set_local_parent();

    anyhow::ensure!(
        segments.len() == tombstones.len(),
        "segments and tombstones length mismatch"
    );

    match run(segments, tombstones, output_path, chunk_factor, options) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(output_path) {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    // Best-effort: the original error is what the caller
                    // needs to see (§10).
                    tracing::warn!(
                        "failed to remove partial output {}: {remove_err}",
                        output_path.display()
                    );
                }
            }
            Err(err)
        }
    }
}

fn run(
    segments: &[&dyn Segment],
    tombstones: &[RoaringBitmap],
    output_path: &Path,
    chunk_factor: u32,
    options: &MergeOptions,
) -> anyhow::Result<MergeOutcome> {
    let unifier = FieldUnifier::compute(segments).map_err(|err| {
        metrics::log_merge_failed(MergePhase::FieldUnify);
        err
    })?;

    let file = fs::File::create(output_path)
        .map_err(|err| anyhow::anyhow!("creating output segment {}: {err}", output_path.display()))?;
    let buffered = BufWriter::with_capacity(options.output_buffer_size, file);
    let mut w = CountingHashingWriter::new(buffered);

    let stored_result = remap_stored_docs(&mut w, &unifier, segments, tombstones).map_err(|err| {
        metrics::log_merge_failed(MergePhase::StoredDocs);
        err
    })?;

    let remaps: Vec<Vec<u64>> = stored_result.remaps.into_iter().map(|r| r.table).collect();

    let postings_result = merge_postings(
        &mut w,
        &unifier,
        segments,
        &remaps,
        tombstones,
        stored_result.new_doc_count,
        chunk_factor,
    )
    .map_err(|err| {
        metrics::log_merge_failed(MergePhase::Postings);
        err
    })?;

    let fields_index_offset =
        write_fields_index(&mut w, &unifier.fields, &postings_result.dict_offsets).map_err(
            |err| {
                metrics::log_merge_failed(MergePhase::Footer);
                err
            },
        )?;

    let doc_value_offset = if stored_result.new_doc_count == 0 {
        FIELD_NOT_UNINVERTED
    } else {
        postings_result.field_dv_locs_offset
    };

    write_footer(
        &mut w,
        stored_result.new_doc_count,
        stored_result.stored_index_offset,
        fields_index_offset,
        doc_value_offset,
        chunk_factor,
    )
    .map_err(|err| {
        metrics::log_merge_failed(MergePhase::Footer);
        err
    })?;

    let file_size = w.bytes_written();
    metrics::log_output_bytes(file_size);

    let mut buffered = w.into_inner();
    buffered.flush()?;
    let file = buffered
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing output segment: {}", err.into_error()))?;
    file.sync_all()?;
    drop(file);

    Ok(MergeOutcome {
        remaps,
        new_doc_count: stored_result.new_doc_count,
        file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        segment::{
            Posting,
            StoredFieldType,
            StoredFieldValue,
        },
        testutil::FakeSegment,
    };

    fn value(field: &str, v: &[u8]) -> StoredFieldValue {
        StoredFieldValue {
            field: field.to_string(),
            typ: StoredFieldType::Text,
            value: v.to_vec(),
            array_positions: vec![],
        }
    }

    #[test]
    fn merges_two_docs_with_no_drops() {
        let dir = std::env::temp_dir().join(format!(
            "segment_merge_test_{}",
            std::process::id()
        ));
        let _ = fs::create_dir_all(&dir);
        let out_path = dir.join("merges_two_docs_with_no_drops.seg");

        let mut seg = FakeSegment::new(vec!["_id".into()]);
        seg.add_doc(vec![value("_id", b"a")]);
        seg.add_doc(vec![value("_id", b"b")]);
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
        seg.add_term(
            "_id",
            b"b",
            vec![Posting {
                doc_num: 1,
                freq: 1,
                norm_bits: 0,
                locations: vec![],
            }],
        );

        let refs: Vec<&dyn Segment> = vec![&seg];
        let outcome = merge_segments(
            &refs,
            &[RoaringBitmap::new()],
            &out_path,
            1024,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.new_doc_count, 2);
        assert_eq!(outcome.remaps, vec![vec![0, 1]]);
        assert!(outcome.file_size > 0);

        let bytes = fs::read(&out_path).unwrap();
        let footer = crate::footer::read_footer(&bytes).unwrap();
        assert_eq!(footer.num_docs, 2);
        assert_eq!(footer.chunk_factor, 1024);

        let _ = fs::remove_file(&out_path);
    }

    #[test]
    fn zero_segments_fails_before_creating_output_file() {
        let dir = std::env::temp_dir().join(format!(
            "segment_merge_test_fail_{}",
            std::process::id()
        ));
        let _ = fs::create_dir_all(&dir);
        let out_path = dir.join("failed_merge_leaves_no_output_file.seg");

        // Zero segments fails the "_id" presence check during unification,
        // before the output file is even created.
        let result = merge_segments(&[], &[], &out_path, 1024, &MergeOptions::default());
        assert!(result.is_err());
        assert!(!out_path.exists());
    }

    #[test]
    fn stored_docs_length_mismatch_is_caught_before_corrupting_output() {
        // Exercises the same length-validation `remap_stored_docs` relies
        // on when invoked mid-merge (after the output file is already
        // open), without needing a `FakeSegment` that can be coaxed into
        // an inconsistent dictionary/postings state.
        let mut seg = FakeSegment::new(vec!["_id".into()]);
        seg.add_doc(vec![value("_id", b"a")]);
        let refs: Vec<&dyn Segment> = vec![&seg];
        let unifier = FieldUnifier::compute(&refs).unwrap();
        let mut w = CountingHashingWriter::new(Vec::new());
        assert!(remap_stored_docs(&mut w, &unifier, &refs, &[]).is_err());
    }
}
