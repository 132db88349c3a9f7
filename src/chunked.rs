//! C2/C3: chunked int and content coders (§4.5).
//!
//! Both partition a logical `docNum -> payload` mapping into fixed-size
//! `chunkFactor`-doc chunks, writing the concatenated per-chunk bodies
//! followed by a self-describing offset table on close. `ChunkedIntCoder`
//! is the varint specialization used for TF and location streams;
//! `ChunkedContentCoder` carries arbitrary byte payloads for doc-values.

use crate::varint::push_uvarint;

/// Produces varint-coded integer streams partitioned into `chunkFactor`-doc
/// chunks (C2).
pub struct ChunkedIntCoder {
    chunk_factor: u32,
    current_chunk: u64,
    chunk_bodies: Vec<Vec<u8>>,
    scratch: Vec<u8>,
}

impl ChunkedIntCoder {
    pub fn new(chunk_factor: u32) -> Self {
        Self {
            chunk_factor,
            current_chunk: 0,
            chunk_bodies: vec![Vec::new()],
            scratch: Vec::new(),
        }
    }

    fn chunk_for(&self, doc_num: u64) -> u64 {
        doc_num / self.chunk_factor as u64
    }

    fn ensure_chunk(&mut self, chunk: u64) {
        while (self.chunk_bodies.len() as u64) <= chunk {
            self.chunk_bodies.push(Vec::new());
        }
    }

    /// Appends a single varint value for `doc_num` to its chunk.
    pub fn add(&mut self, doc_num: u64, val: u64) {
        let chunk = self.chunk_for(doc_num);
        self.ensure_chunk(chunk);
        self.current_chunk = self.current_chunk.max(chunk);
        push_uvarint(&mut self.chunk_bodies[chunk as usize], val);
    }

    /// Appends multiple varint values for `doc_num` to its chunk, in order.
    pub fn add_multi(&mut self, doc_num: u64, vals: &[u64]) {
        let chunk = self.chunk_for(doc_num);
        self.ensure_chunk(chunk);
        self.current_chunk = self.current_chunk.max(chunk);
        let body = &mut self.chunk_bodies[chunk as usize];
        for &v in vals {
            push_uvarint(body, v);
        }
    }

    /// Appends pre-encoded bytes for `doc_num` to its chunk, used by the
    /// fast path to splice in another segment's already-encoded varints
    /// without re-parsing them (§4.4 "per-term merge (fast form)").
    pub fn add_encoded_bytes(&mut self, doc_num: u64, bytes: &[u8]) {
        let chunk = self.chunk_for(doc_num);
        self.ensure_chunk(chunk);
        self.current_chunk = self.current_chunk.max(chunk);
        self.chunk_bodies[chunk as usize].extend_from_slice(bytes);
    }

    /// Current total body length across all chunks, used to detect "no
    /// locations emitted" for the 1-hit predicate (§4.4 step 5).
    pub fn final_size(&self) -> usize {
        self.chunk_bodies.iter().map(|c| c.len()).sum()
    }

    pub fn reset(&mut self) {
        self.current_chunk = 0;
        self.chunk_bodies.clear();
        self.chunk_bodies.push(Vec::new());
        self.scratch.clear();
    }

    /// Closes the coder, returning the final on-disk byte layout: bodies
    /// concatenated, followed by a varint table of per-chunk lengths, the
    /// chunk count, and the overall body length so the stream is
    /// self-describing on read.
    pub fn close(&mut self) -> Vec<u8> {
        self.scratch.clear();
        let num_chunks = self.chunk_bodies.len();
        let total_body_len: usize = self.chunk_bodies.iter().map(|c| c.len()).sum();

        let mut out = Vec::with_capacity(total_body_len + num_chunks * 2 + 16);
        for body in &self.chunk_bodies {
            out.extend_from_slice(body);
        }
        for body in &self.chunk_bodies {
            push_uvarint(&mut out, body.len() as u64);
        }
        push_uvarint(&mut out, num_chunks as u64);
        push_uvarint(&mut out, total_body_len as u64);
        out
    }
}

/// Same chunking discipline as `ChunkedIntCoder`, but for arbitrary byte
/// payloads per docNum (C3), used by the doc-values emitter.
pub struct ChunkedContentCoder {
    chunk_factor: u32,
    chunk_bodies: Vec<Vec<u8>>,
}

impl ChunkedContentCoder {
    pub fn new(chunk_factor: u32) -> Self {
        Self {
            chunk_factor,
            chunk_bodies: vec![Vec::new()],
        }
    }

    fn chunk_for(&self, doc_num: u64) -> u64 {
        doc_num / self.chunk_factor as u64
    }

    fn ensure_chunk(&mut self, chunk: u64) {
        while (self.chunk_bodies.len() as u64) <= chunk {
            self.chunk_bodies.push(Vec::new());
        }
    }

    /// Appends `content` for `doc_num`, length-prefixed within its chunk so
    /// per-doc payloads inside a chunk remain individually addressable.
    pub fn add(&mut self, doc_num: u64, content: &[u8]) {
        let chunk = self.chunk_for(doc_num);
        self.ensure_chunk(chunk);
        let body = &mut self.chunk_bodies[chunk as usize];
        push_uvarint(body, content.len() as u64);
        body.extend_from_slice(content);
    }

    pub fn reset(&mut self) {
        self.chunk_bodies.clear();
        self.chunk_bodies.push(Vec::new());
    }

    pub fn close(&mut self) -> Vec<u8> {
        let num_chunks = self.chunk_bodies.len();
        let total_body_len: usize = self.chunk_bodies.iter().map(|c| c.len()).sum();

        let mut out = Vec::with_capacity(total_body_len + num_chunks * 2 + 16);
        for body in &self.chunk_bodies {
            out.extend_from_slice(body);
        }
        for body in &self.chunk_bodies {
            push_uvarint(&mut out, body.len() as u64);
        }
        push_uvarint(&mut out, num_chunks as u64);
        push_uvarint(&mut out, total_body_len as u64);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::read_uvarint_from_slice;

    #[test]
    fn empty_coder_closes_to_self_describing_empty_stream() {
        let mut coder = ChunkedIntCoder::new(4);
        let out = coder.close();
        // Single empty chunk: zero-length entry, chunk count 1, total len 0.
        let (chunk_len, n1) = read_uvarint_from_slice(&out).unwrap();
        let (num_chunks, n2) = read_uvarint_from_slice(&out[n1..]).unwrap();
        let (total_len, _) = read_uvarint_from_slice(&out[n1 + n2..]).unwrap();
        assert_eq!(chunk_len, 0);
        assert_eq!(num_chunks, 1);
        assert_eq!(total_len, 0);
    }

    #[test]
    fn spans_multiple_chunks_by_doc_num() {
        let mut coder = ChunkedIntCoder::new(2);
        coder.add(0, 10);
        coder.add(1, 20);
        coder.add(2, 30); // falls into the second chunk (docs 2-3)
        assert!(coder.final_size() > 0);
        let out = coder.close();
        assert!(!out.is_empty());
    }

    #[test]
    fn reset_clears_state_for_reuse() {
        let mut coder = ChunkedIntCoder::new(4);
        coder.add(0, 99);
        assert!(coder.final_size() > 0);
        coder.reset();
        assert_eq!(coder.final_size(), 0);
    }

    #[test]
    fn content_coder_round_trips_lengths() {
        let mut coder = ChunkedContentCoder::new(4);
        coder.add(0, b"hello");
        coder.add(1, b"");
        coder.add(5, b"world!");
        let out = coder.close();
        assert!(!out.is_empty());
    }
}
