//! Counters and timers for the merge phases (§10). Mirrors the
//! `register_convex_counter!` / `StatusTimer` call-site shape used
//! elsewhere in the codebase, backed here by the `metrics` crate's
//! `counter!`/`histogram!` macros.

use std::time::Instant;

use metrics::{
    counter,
    histogram,
};

/// RAII timer that records an elapsed-seconds histogram, optionally tagged
/// with an outcome label, when dropped. Mirrors `StatusTimer`.
pub struct StatusTimer {
    metric_name: &'static str,
    start: Instant,
    status: &'static str,
}

impl StatusTimer {
    fn new(metric_name: &'static str) -> Self {
        Self {
            metric_name,
            start: Instant::now(),
            status: "success",
        }
    }

    pub fn set_status(&mut self, status: &'static str) {
        self.status = status;
    }
}

impl Drop for StatusTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name, "status" => self.status)
            .record(self.start.elapsed().as_secs_f64());
    }
}

pub fn merge_segments_timer() -> StatusTimer {
    StatusTimer::new("segment_merge.merge_segments_seconds")
}

pub fn stored_docs_remap_timer() -> StatusTimer {
    StatusTimer::new("segment_merge.stored_docs_remap_seconds")
}

pub fn field_postings_merge_timer() -> StatusTimer {
    StatusTimer::new("segment_merge.field_postings_merge_seconds")
}

pub fn log_docs_dropped(count: u64) {
    counter!("segment_merge.docs_dropped_total").increment(count);
}

pub fn log_docs_kept(count: u64) {
    counter!("segment_merge.docs_kept_total").increment(count);
}

pub fn log_stored_docs_fast_path() {
    counter!("segment_merge.stored_docs_fast_path_total").increment(1);
}

pub fn log_stored_docs_slow_path() {
    counter!("segment_merge.stored_docs_slow_path_total").increment(1);
}

pub fn log_postings_fast_path() {
    counter!("segment_merge.postings_fast_path_total").increment(1);
}

pub fn log_postings_slow_path() {
    counter!("segment_merge.postings_slow_path_total").increment(1);
}

pub fn log_one_hit_encoded() {
    counter!("segment_merge.one_hit_encoded_total").increment(1);
}

pub fn log_output_bytes(bytes: u64) {
    histogram!("segment_merge.output_bytes").record(bytes as f64);
}

/// Which phase a merge failed in, for the `merge_failed_total` counter
/// below (§10: "so operators can tell 'bad input segment' apart from
/// 'disk full' without parsing error strings").
#[derive(Debug, Clone, Copy)]
pub enum MergePhase {
    FieldUnify,
    StoredDocs,
    Postings,
    Footer,
}

impl MergePhase {
    fn as_label(self) -> &'static str {
        match self {
            MergePhase::FieldUnify => "field_unify",
            MergePhase::StoredDocs => "stored_docs",
            MergePhase::Postings => "postings",
            MergePhase::Footer => "footer",
        }
    }
}

pub fn log_merge_failed(phase: MergePhase) {
    counter!("segment_merge.merge_failed_total", "phase" => phase.as_label()).increment(1);
}
