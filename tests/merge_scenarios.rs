//! End-to-end coverage of the six numbered scenarios in §8, run against
//! `FakeSegment` since a real on-disk segment reader/writer is out of
//! scope (§1). Requires the `testing` feature (see `Cargo.toml`).

use roaring::RoaringBitmap;
use segment_merge::{
    driver::MergeOptions,
    footer::{
        read_footer,
        FIELD_NOT_UNINVERTED,
    },
    merge_segments,
    segment::{
        Location,
        Posting,
        Segment,
        StoredFieldType,
        StoredFieldValue,
        DROPPED,
    },
    testutil::FakeSegment,
};

fn stored(field: &str, v: &[u8]) -> StoredFieldValue {
    StoredFieldValue {
        field: field.to_string(),
        typ: StoredFieldType::Text,
        value: v.to_vec(),
        array_positions: vec![],
    }
}

fn temp_output(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("segment_merge_scenarios_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

/// Scenario 1: one segment, two docs, no drops.
#[test]
fn scenario_one_segment_two_docs_no_drops() {
    let mut seg = FakeSegment::new(vec!["_id".into()]);
    seg.add_doc(vec![stored("_id", b"a")]);
    seg.add_doc(vec![stored("_id", b"b")]);
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
    let out_path = temp_output("scenario1.seg");
    let outcome = merge_segments(
        &refs,
        &[RoaringBitmap::new()],
        &out_path,
        4,
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.new_doc_count, 2);
    assert_eq!(outcome.remaps, vec![vec![0, 1]]);

    let bytes = std::fs::read(&out_path).unwrap();
    let footer = read_footer(&bytes).unwrap();
    assert_eq!(footer.num_docs, 2);
    assert_eq!(footer.chunk_factor, 4);

    let _ = std::fs::remove_file(&out_path);
}

/// Scenario 2: two single-doc segments, drop the doc in segment 0.
#[test]
fn scenario_drop_doc_in_one_segment() {
    let mut seg_a = FakeSegment::new(vec!["_id".into()]);
    seg_a.add_doc(vec![stored("_id", b"a")]);
    seg_a.add_term(
        "_id",
        b"a",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );

    let mut seg_b = FakeSegment::new(vec!["_id".into()]);
    seg_b.add_doc(vec![stored("_id", b"b")]);
    seg_b.add_term(
        "_id",
        b"b",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );

    let refs: Vec<&dyn Segment> = vec![&seg_a, &seg_b];
    let mut tomb_a = RoaringBitmap::new();
    tomb_a.insert(0);
    let out_path = temp_output("scenario2.seg");
    let outcome = merge_segments(
        &refs,
        &[tomb_a, RoaringBitmap::new()],
        &out_path,
        4,
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.new_doc_count, 1);
    assert_eq!(outcome.remaps[0], vec![DROPPED]);
    assert_eq!(outcome.remaps[1], vec![0]);

    let _ = std::fs::remove_file(&out_path);
}

/// Scenario 3: overlapping term across two segments, one with locations.
#[test]
fn scenario_overlapping_term_with_and_without_locations() {
    let mut seg_a = FakeSegment::new(vec!["_id".into(), "body".into()]);
    seg_a.add_doc(vec![stored("_id", b"a")]);
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
    seg_b.add_doc(vec![stored("_id", b"b")]);
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
    let out_path = temp_output("scenario3.seg");
    let outcome = merge_segments(
        &refs,
        &[RoaringBitmap::new(), RoaringBitmap::new()],
        &out_path,
        4,
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.new_doc_count, 2);
    let _ = std::fs::remove_file(&out_path);
}

/// Scenario 4: identical schema, one segment tombstoned, the other not —
/// `fieldsSame` holds, fast path applies where eligible, slow path
/// elsewhere, output still well-formed.
#[test]
fn scenario_fields_same_mixed_tombstones() {
    let mut seg_a = FakeSegment::new(vec!["_id".into(), "title".into()]);
    seg_a.add_doc(vec![stored("_id", b"a"), stored("title", b"Alpha")]);
    seg_a.add_term(
        "_id",
        b"a",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );

    let mut seg_b = FakeSegment::new(vec!["_id".into(), "title".into()]);
    seg_b.add_doc(vec![stored("_id", b"b"), stored("title", b"Beta")]);
    seg_b.add_doc(vec![stored("_id", b"c"), stored("title", b"Gamma")]);
    seg_b.add_term(
        "_id",
        b"b",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );
    seg_b.add_term(
        "_id",
        b"c",
        vec![Posting {
            doc_num: 1,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );
    let mut tomb_b = RoaringBitmap::new();
    tomb_b.insert(1);

    let refs: Vec<&dyn Segment> = vec![&seg_a, &seg_b];
    let out_path = temp_output("scenario4.seg");
    let outcome = merge_segments(
        &refs,
        &[RoaringBitmap::new(), tomb_b],
        &out_path,
        4,
        &MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.new_doc_count, 2);
    assert_eq!(outcome.remaps[0], vec![0]);
    assert_eq!(outcome.remaps[1], vec![1, DROPPED]);

    let _ = std::fs::remove_file(&out_path);
}

/// Scenario 5: different field orders across segments disables
/// `fieldsSame`; the merged inventory is still `_id` followed by the
/// lexicographically sorted remainder.
#[test]
fn scenario_different_field_orders_disables_fast_path() {
    let mut seg_a = FakeSegment::new(vec!["_id".into(), "a".into(), "b".into()]);
    seg_a.add_doc(vec![stored("_id", b"x")]);
    seg_a.add_term(
        "_id",
        b"x",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );

    let mut seg_b = FakeSegment::new(vec!["_id".into(), "b".into(), "a".into()]);
    seg_b.add_doc(vec![stored("_id", b"y")]);
    seg_b.add_term(
        "_id",
        b"y",
        vec![Posting {
            doc_num: 0,
            freq: 1,
            norm_bits: 0,
            locations: vec![],
        }],
    );

    let refs: Vec<&dyn Segment> = vec![&seg_a, &seg_b];
    let unifier = segment_merge::fields::FieldUnifier::compute(&refs).unwrap();
    assert!(!unifier.fields_same);
    assert_eq!(unifier.fields, vec!["_id", "a", "b"]);

    let out_path = temp_output("scenario5.seg");
    let outcome = merge_segments(
        &refs,
        &[RoaringBitmap::new(), RoaringBitmap::new()],
        &out_path,
        4,
        &MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.new_doc_count, 2);

    let _ = std::fs::remove_file(&out_path);
}

/// Scenario 6: every doc tombstoned — `newDocCount=0`, the doc-value
/// section sentinel is set, the footer is still well-formed.
#[test]
fn scenario_all_docs_tombstoned() {
    let mut seg = FakeSegment::new(vec!["_id".into()]);
    seg.add_doc(vec![stored("_id", b"a")]);
    seg.add_doc(vec![stored("_id", b"b")]);
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

    let mut tomb = RoaringBitmap::new();
    tomb.insert(0);
    tomb.insert(1);

    let refs: Vec<&dyn Segment> = vec![&seg];
    let out_path = temp_output("scenario6.seg");
    let outcome = merge_segments(&refs, &[tomb], &out_path, 4, &MergeOptions::default()).unwrap();

    assert_eq!(outcome.new_doc_count, 0);
    assert_eq!(outcome.remaps[0], vec![DROPPED, DROPPED]);

    let bytes = std::fs::read(&out_path).unwrap();
    let footer = read_footer(&bytes).unwrap();
    assert_eq!(footer.num_docs, 0);
    assert_eq!(footer.doc_value_offset, FIELD_NOT_UNINVERTED);

    let _ = std::fs::remove_file(&out_path);
}
