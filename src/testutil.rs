//! Test-only in-memory `Segment` (§13). Gated behind `cfg(test)` or the
//! `testing` feature so integration tests in `tests/` can build scenarios
//! without a real on-disk segment writer, which is out of scope (§1).

use std::collections::BTreeMap;

use roaring::RoaringBitmap;

use crate::segment::{
    encode_loc_entry,
    encode_tf_entry,
    Dictionary,
    EncodedPostingChunk,
    Location,
    Posting,
    Segment,
    StoredFieldValue,
    StoredFieldVisitor,
};

/// A single field's postings in one `FakeSegment`, stored in docNum order.
#[derive(Debug, Clone, Default)]
pub struct FakeFieldPostings {
    pub postings: Vec<Posting>,
}

struct FakeDictionary {
    /// term -> index into the owning field's `postings` table. The "offset"
    /// here is purely a `FakeSegment`-local handle, not a byte offset.
    terms: BTreeMap<Vec<u8>, u64>,
}

impl Dictionary for FakeDictionary {
    fn iter(&self) -> Box<dyn Iterator<Item = (Vec<u8>, u64)> + '_> {
        Box::new(self.terms.iter().map(|(t, &o)| (t.clone(), o)))
    }
}

struct FakePostingsIterator {
    postings: Vec<Posting>,
    tombstones: RoaringBitmap,
    pos: usize,
}

impl crate::segment::PostingsIterator for FakePostingsIterator {
    fn next_posting(&mut self) -> anyhow::Result<Option<Posting>> {
        while self.pos < self.postings.len() {
            let p = self.postings[self.pos].clone();
            self.pos += 1;
            if !self.tombstones.contains(p.doc_num as u32) {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    fn next_encoded(&mut self) -> anyhow::Result<Option<EncodedPostingChunk>> {
        while self.pos < self.postings.len() {
            let p = &self.postings[self.pos];
            self.pos += 1;
            if self.tombstones.contains(p.doc_num as u32) {
                continue;
            }
            let mut tf_bytes = encode_tf_entry(p.freq, !p.locations.is_empty(), p.norm_bits);
            let mut loc_bytes = Vec::new();
            for loc in &p.locations {
                loc_bytes.extend(encode_loc_entry(loc));
            }
            tf_bytes.shrink_to_fit();
            return Ok(Some(EncodedPostingChunk {
                doc_num: p.doc_num,
                tf_bytes,
                loc_bytes,
            }));
        }
        Ok(None)
    }
}

/// An in-memory `Segment` double. Construct with [`FakeSegment::new`], then
/// populate stored docs and per-field postings with the builder methods
/// before handing `&dyn Segment` references to the component under test.
pub struct FakeSegment {
    fields: Vec<String>,
    stored: Vec<Vec<StoredFieldValue>>,
    postings: BTreeMap<String, FakeFieldPostings>,
    dicts: BTreeMap<String, FakeDictionary>,
}

impl FakeSegment {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            stored: Vec::new(),
            postings: BTreeMap::new(),
            dicts: BTreeMap::new(),
        }
    }

    /// Appends a document's stored field values, assigning it the next
    /// sequential docNum.
    pub fn add_doc(&mut self, values: Vec<StoredFieldValue>) -> u64 {
        let doc_num = self.stored.len() as u64;
        self.stored.push(values);
        doc_num
    }

    /// Registers `term`'s complete posting list for `field`. Postings must
    /// be supplied in ascending `doc_num` order, matching an on-disk
    /// dictionary's iteration contract.
    pub fn add_term(&mut self, field: &str, term: &[u8], postings: Vec<Posting>) {
        let field_postings = self.postings.entry(field.to_string()).or_default();
        let offset = field_postings.postings.len() as u64;
        field_postings.postings.extend(postings.iter().cloned());

        let dict = self.dicts.entry(field.to_string()).or_insert_with(|| FakeDictionary {
            terms: BTreeMap::new(),
        });
        dict.terms.insert(term.to_vec(), offset);
        let _ = postings;
    }
}

impl Segment for FakeSegment {
    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn doc_count(&self) -> u64 {
        self.stored.len() as u64
    }

    fn dictionary(&self, field: &str) -> Option<&dyn Dictionary> {
        self.dicts.get(field).map(|d| d as &dyn Dictionary)
    }

    fn postings_list(
        &self,
        field: &str,
        postings_offset: u64,
        tombstones: &RoaringBitmap,
    ) -> anyhow::Result<Box<dyn crate::segment::PostingsIterator + '_>> {
        let field_postings = self
            .postings
            .get(field)
            .ok_or_else(|| anyhow::anyhow!("FakeSegment has no postings for field {field:?}"))?;
        anyhow::ensure!(
            (postings_offset as usize) <= field_postings.postings.len(),
            "postings offset {postings_offset} out of range for field {field:?}"
        );

        // A single `add_term` call registers one contiguous run; locate it
        // by re-scanning for the term whose offset matches. Since offsets
        // are assigned monotonically by `add_term`, the run for this
        // offset ends either at the next registered offset or the table's
        // end.
        let mut offsets: Vec<u64> = self
            .dicts
            .get(field)
            .into_iter()
            .flat_map(|d| d.terms.values().copied())
            .collect();
        offsets.sort_unstable();
        let end = offsets
            .iter()
            .find(|&&o| o > postings_offset)
            .copied()
            .unwrap_or(field_postings.postings.len() as u64);

        let postings =
            field_postings.postings[postings_offset as usize..end as usize].to_vec();
        Ok(Box::new(FakePostingsIterator {
            postings,
            tombstones: tombstones.clone(),
            pos: 0,
        }))
    }

    fn visit_stored_doc(
        &self,
        doc_num: u64,
        visitor: &mut dyn StoredFieldVisitor,
    ) -> anyhow::Result<()> {
        let values = self
            .stored
            .get(doc_num as usize)
            .ok_or_else(|| anyhow::anyhow!("FakeSegment has no doc {doc_num}"))?;
        for v in values {
            visitor.visit(v.clone());
        }
        Ok(())
    }

    fn stored_offsets(&self, doc_num: u64) -> anyhow::Result<(u64, u64, u64, u64, u64)> {
        anyhow::ensure!(
            (doc_num as usize) < self.stored.len(),
            "FakeSegment has no doc {doc_num}"
        );
        // FakeSegment never supports the stored-docs byte-copy fast path:
        // it has no real backing byte region to slice. Callers must fall
        // back to the slow path whenever `mem()` is empty.
        Ok((0, 0, 0, 0, 0))
    }

    fn mem(&self) -> &[u8] {
        &[]
    }
}
