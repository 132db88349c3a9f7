//! C4: merges `k` sorted per-segment term dictionaries into a single
//! ascending stream of `(term, sourceIndex, postingsOffset)` (§4.3).
//!
//! Expressed as a small binary-heap-backed k-way merge (§9 "iterator
//! composition... is best expressed as a small heap-backed merge"), with
//! ties at the same term broken deterministically by ascending source
//! index so the postings merger's fast-path byte-copy sees a stable,
//! reproducible visitation order (§9).

use std::{
    cmp::{
        Ordering,
        Reverse,
    },
    collections::BinaryHeap,
};

/// One term entry emitted by the enumerator: the term bytes, which input
/// segment it came from, and that segment's postings offset for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term: Vec<u8>,
    pub source_index: usize,
    pub postings_offset: u64,
}

struct HeapEntry {
    term: Vec<u8>,
    source_index: usize,
    postings_offset: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.source_index == other.source_index
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse() below turns this max-heap into a min-heap on (term, source_index).
        self.term
            .cmp(&other.term)
            .then(self.source_index.cmp(&other.source_index))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges `k` sorted `(term, postingsOffset)` iterators, one per input
/// segment that has the field being merged, into ascending `(term,
/// sourceIndex, postingsOffset)` order. At each step, every iterator whose
/// current term equals the global minimum is emitted (in source-index
/// order) and advanced together; this lets the postings merger fold all
/// sources contributing to a term into one close-out pass (§4.4 step 3).
pub struct DictionaryEnumerator<'a> {
    iters: Vec<Box<dyn Iterator<Item = (Vec<u8>, u64)> + 'a>>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl<'a> DictionaryEnumerator<'a> {
    pub fn new(mut iters: Vec<Box<dyn Iterator<Item = (Vec<u8>, u64)> + 'a>>) -> Self {
        let mut heap = BinaryHeap::new();
        for (source_index, it) in iters.iter_mut().enumerate() {
            if let Some((term, postings_offset)) = it.next() {
                heap.push(Reverse(HeapEntry {
                    term,
                    source_index,
                    postings_offset,
                }));
            }
        }
        Self { iters, heap }
    }

    /// Returns every entry sharing the next (lexicographically smallest)
    /// term, in ascending `sourceIndex` order, and advances those
    /// iterators. Returns an empty `Vec` only once all iterators are
    /// exhausted.
    pub fn next_term_group(&mut self) -> Vec<TermEntry> {
        let mut group = Vec::new();
        let Some(Reverse(first)) = self.heap.pop() else {
            return group;
        };
        let min_term = first.term.clone();
        self.refill(first.source_index);
        group.push(TermEntry {
            term: first.term,
            source_index: first.source_index,
            postings_offset: first.postings_offset,
        });

        while let Some(&Reverse(ref top)) = self.heap.peek() {
            if top.term != min_term {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap();
            self.refill(entry.source_index);
            group.push(TermEntry {
                term: entry.term,
                source_index: entry.source_index,
                postings_offset: entry.postings_offset,
            });
        }

        group.sort_by_key(|e| e.source_index);
        group
    }

    fn refill(&mut self, source_index: usize) {
        if let Some((term, postings_offset)) = self.iters[source_index].next() {
            self.heap.push(Reverse(HeapEntry {
                term,
                source_index,
                postings_offset,
            }));
        }
    }
}
