//! The segment read contract consumed by the merger (§6). Per-segment
//! writing, reading, query-time iteration, and the enclosing index/shard
//! lifecycle are out of scope (§1) — this module only declares the traits
//! an external collaborator must implement for its segments to be
//! mergeable, plus the shared data-model types of §3.

use roaring::RoaringBitmap;

use crate::varint::push_uvarint;

/// Sentinel recorded in a remap table for a tombstoned docNum (§3).
pub const DROPPED: u64 = u64::MAX;

/// `(fieldID, position, start, end, arrayPositions[])` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub field_id: u32,
    pub position: u64,
    pub start: u64,
    pub end: u64,
    pub array_positions: Vec<u64>,
}

/// `(docNum, freq, norm, locations[])` (§3). `norm` is the IEEE-754
/// single-precision bit pattern widened to `u64` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_num: u64,
    pub freq: u64,
    pub norm_bits: u32,
    pub locations: Vec<Location>,
}

/// Closed set of stored-field type tags (§12). The merger treats the
/// payload bytes as opaque and only relocates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoredFieldType {
    Text = 0,
    Number = 1,
    Boolean = 2,
    Geopoint = 3,
    DateTime = 4,
    Composite = 5,
}

impl StoredFieldType {
    pub fn from_u8(b: u8) -> anyhow::Result<Self> {
        Ok(match b {
            0 => Self::Text,
            1 => Self::Number,
            2 => Self::Boolean,
            3 => Self::Geopoint,
            4 => Self::DateTime,
            5 => Self::Composite,
            other => anyhow::bail!("unknown stored field type tag {other}"),
        })
    }
}

/// One stored value visited for a document: `(field, type, value, array
/// positions)` (§3).
#[derive(Debug, Clone)]
pub struct StoredFieldValue {
    pub field: String,
    pub typ: StoredFieldType,
    pub value: Vec<u8>,
    pub array_positions: Vec<u64>,
}

/// Visitor callback invoked once per stored field value on a document
/// (§6 `visitStoredDoc`).
pub trait StoredFieldVisitor {
    fn visit(&mut self, value: StoredFieldValue);
}

/// Byte-copyable encoded postings for the fast path: the already-encoded
/// TF and location chunk bytes for a single docNum, pulled straight out of
/// a source segment's on-disk stream without re-parsing (§4.4 fast form).
#[derive(Debug, Clone)]
pub struct EncodedPostingChunk {
    pub doc_num: u64,
    pub tf_bytes: Vec<u8>,
    pub loc_bytes: Vec<u8>,
}

/// An ordered term -> postings-offset dictionary for one field in one
/// segment (§3 "per-field dictionary (FST mapping term -> payload
/// offset)").
pub trait Dictionary {
    /// An iterator over `(term, postings_offset)` pairs in ascending term
    /// order.
    fn iter(&self) -> Box<dyn Iterator<Item = (Vec<u8>, u64)> + '_>;
}

/// Yields the surviving postings for one term, with tombstoned docs
/// already elided (§6).
pub trait PostingsIterator {
    fn next_posting(&mut self) -> anyhow::Result<Option<Posting>>;

    /// The fast-path byte-copy variant: yields pre-encoded chunk bytes
    /// instead of parsed `Posting`s. Only valid when `fieldsSame` holds.
    fn next_encoded(&mut self) -> anyhow::Result<Option<EncodedPostingChunk>>;
}

/// Encodes one TF-stream entry for a single docNum, in the wire order the
/// slow-form merge appends them in (§4.4): `(freq<<1)|hasLocs, normBits`.
/// The docNum itself is not part of the returned bytes — callers place it
/// via the chunked coder's own docNum-keyed chunk selection.
pub fn encode_tf_entry(freq: u64, has_locs: bool, norm_bits: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let freq_word = (freq << 1) | (has_locs as u64);
    push_uvarint(&mut out, freq_word);
    push_uvarint(&mut out, norm_bits as u64);
    out
}

/// Encodes one location-stream entry, in the wire order of §4.4:
/// `fieldID, pos, start, end, |arrayPositions|, arrayPositions…`.
pub fn encode_loc_entry(loc: &Location) -> Vec<u8> {
    let mut out = Vec::new();
    push_uvarint(&mut out, loc.field_id as u64);
    push_uvarint(&mut out, loc.position);
    push_uvarint(&mut out, loc.start);
    push_uvarint(&mut out, loc.end);
    push_uvarint(&mut out, loc.array_positions.len() as u64);
    for &p in &loc.array_positions {
        push_uvarint(&mut out, p);
    }
    out
}

/// An immutable input segment (§3/§6).
pub trait Segment {
    /// Ordered, distinct field names as stored in this segment.
    fn fields(&self) -> &[String];

    fn doc_count(&self) -> u64;

    /// The term dictionary for `field`, if the segment has any postings
    /// for it.
    fn dictionary(&self, field: &str) -> Option<&dyn Dictionary>;

    /// Opens the postings list for `field` at `postings_offset`, filtering
    /// out any docNum present in `tombstones`.
    fn postings_list(
        &self,
        field: &str,
        postings_offset: u64,
        tombstones: &RoaringBitmap,
    ) -> anyhow::Result<Box<dyn PostingsIterator + '_>>;

    /// Visits every stored field value for `doc_num`.
    fn visit_stored_doc(
        &self,
        doc_num: u64,
        visitor: &mut dyn StoredFieldVisitor,
    ) -> anyhow::Result<()>;

    /// `(index_offset, stored_offset, read_len, meta_len, data_len)` for
    /// `doc_num`'s raw stored record, used only by the stored-docs
    /// byte-copy fast path (§4.2, §9 open question on contiguity).
    fn stored_offsets(&self, doc_num: u64) -> anyhow::Result<(u64, u64, u64, u64, u64)>;

    /// Raw byte-slice view behind this segment's stored region, for
    /// fast-path copying.
    fn mem(&self) -> &[u8];
}
