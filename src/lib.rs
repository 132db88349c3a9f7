//! Merges immutable, on-disk inverted-index segments: drops tombstoned
//! docs, renumbers survivors into a dense docNum space, and re-emits
//! per-field dictionaries, postings, stored docs, and doc-values as a
//! single new segment (§1).
//!
//! Per-segment writing, reading, and query-time iteration are out of
//! scope; callers provide segments through the [`segment::Segment`] trait.
//! The single entry point is [`merge_segments`].

pub mod chunked;
pub mod dict_merge;
pub mod docvalues;
pub mod driver;
pub mod fields;
pub mod footer;
pub mod metrics;
pub mod postings;
pub mod segment;
pub mod stored;
pub mod varint;
pub mod writer;

#[cfg(any(test, feature = "testing"))]
pub mod testutil;

pub use driver::{
    merge_segments,
    MergeOptions,
    MergeOutcome,
};
pub use segment::{
    Dictionary,
    Location,
    Posting,
    PostingsIterator,
    Segment,
    StoredFieldType,
    StoredFieldValue,
    StoredFieldVisitor,
    DROPPED,
};
