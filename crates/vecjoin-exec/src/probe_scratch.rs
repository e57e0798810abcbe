//! Per-batch probe buffers.
//!
//! Owned by one joiner and reused across probe batches: every buffer is
//! resized to the current batch and refilled, never reallocated per call
//! once the largest batch has been seen.

use vecjoin_types::Batch;

/// Working state of the probe phase.
///
/// Row ids stored here are hash table ids: 1-based, with 0 meaning "no row".
#[derive(Debug, Default)]
pub struct ProbeScratch {
    /// Physical row of each logical probe row.
    pub(crate) probe_rows: Vec<usize>,
    pub(crate) hashes: Vec<u64>,
    /// Whether any equality column of the probe row is NULL.
    pub(crate) has_null: Vec<bool>,
    pub(crate) buckets: Vec<usize>,
    /// Current candidate build row per probe row.
    pub(crate) group_id: Vec<usize>,
    /// First matching build row per probe row; advanced in place when a
    /// partially emitted row is resumed.
    pub(crate) head_id: Vec<usize>,
    /// Probe rows still walking their bucket chain.
    pub(crate) to_check: Vec<usize>,
    pub(crate) differs: Vec<bool>,

    pub(crate) build_idx: Vec<usize>,
    /// Physical rows of the probe batch paired with `build_idx`.
    pub(crate) probe_idx: Vec<usize>,
    pub(crate) probe_row_unmatched: Vec<bool>,
    /// Zero-based build rows gathered into the output.
    pub(crate) build_rows: Vec<usize>,

    /// Indexed by zero-based build row; kept for the whole probe phase.
    pub(crate) build_row_matched: Vec<bool>,
}

/// Probe batch whose collection did not fit one output batch.
#[derive(Debug, Clone)]
pub struct ProbeState {
    pub(crate) prev_batch: Batch,
    /// First logical probe row with work left.
    pub(crate) prev_batch_resume_idx: usize,
}

impl ProbeScratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the per-row buffers for `batch`.
    pub(crate) fn prepare_for_batch(&mut self, batch: &Batch) {
        let n = batch.len();
        self.probe_rows.clear();
        self.probe_rows
            .extend((0..n).map(|logical| batch.physical_index(logical)));
        self.buckets.clear();
        self.buckets.resize(n, 0);
        self.group_id.clear();
        self.group_id.resize(n, 0);
        self.head_id.clear();
        self.head_id.resize(n, 0);
        self.differs.clear();
        self.differs.resize(n, false);
        self.to_check.clear();
    }

    pub(crate) fn clear_collected(&mut self) {
        self.build_idx.clear();
        self.probe_idx.clear();
        self.probe_row_unmatched.clear();
        self.build_rows.clear();
    }

    /// Forget matched flags and size them for `rows` build rows.
    pub(crate) fn reset_build_matches(&mut self, rows: usize) {
        self.build_row_matched.clear();
        self.build_row_matched.resize(rows, false);
    }

    /// Number of build rows marked matched so far.
    #[must_use]
    pub fn matched_build_rows(&self) -> usize {
        self.build_row_matched.iter().filter(|&&m| m).count()
    }

    pub(crate) fn reset(&mut self) {
        self.clear_collected();
        self.to_check.clear();
        self.build_row_matched.clear();
    }
}
