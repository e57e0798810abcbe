//! Hash join observability counters.
//!
//! Process-wide counters, cheap enough to bump from the probe loop. Tests
//! running in parallel share them, so assertions should compare deltas with
//! `>=`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of hash join metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashJoinMetricsSnapshot {
    /// Rows materialized into hash tables.
    pub vecjoin_build_rows_total: u64,
    pub vecjoin_probe_batches_total: u64,
    pub vecjoin_probe_rows_total: u64,
    /// Equality-check rounds over bucket chains.
    pub vecjoin_chain_rounds_total: u64,
    pub vecjoin_output_batches_total: u64,
    pub vecjoin_output_rows_total: u64,
    /// Pulls that continued a partially collected probe batch.
    pub vecjoin_resumed_collections_total: u64,
    /// Rows produced by the emit-right phase.
    pub vecjoin_emit_right_rows_total: u64,
    /// Build-side charges refused by a bounded allocator.
    pub vecjoin_memory_limit_refusals_total: u64,
}

static BUILD_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static PROBE_BATCHES_TOTAL: AtomicU64 = AtomicU64::new(0);
static PROBE_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_ROUNDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static OUTPUT_BATCHES_TOTAL: AtomicU64 = AtomicU64::new(0);
static OUTPUT_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RESUMED_COLLECTIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static EMIT_RIGHT_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static MEMORY_LIMIT_REFUSALS_TOTAL: AtomicU64 = AtomicU64::new(0);

fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(u64::try_from(n).unwrap_or(u64::MAX), Ordering::Relaxed);
}

pub(crate) fn record_build(rows: usize) {
    add(&BUILD_ROWS_TOTAL, rows);
}

pub(crate) fn record_probe_batch(rows: usize, chain_rounds: usize) {
    PROBE_BATCHES_TOTAL.fetch_add(1, Ordering::Relaxed);
    add(&PROBE_ROWS_TOTAL, rows);
    add(&CHAIN_ROUNDS_TOTAL, chain_rounds);
}

pub(crate) fn record_output_batch(rows: usize) {
    OUTPUT_BATCHES_TOTAL.fetch_add(1, Ordering::Relaxed);
    add(&OUTPUT_ROWS_TOTAL, rows);
}

pub(crate) fn record_resumed_collection() {
    RESUMED_COLLECTIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_emit_right(rows: usize) {
    add(&EMIT_RIGHT_ROWS_TOTAL, rows);
}

pub(crate) fn record_memory_limit_refusal() {
    MEMORY_LIMIT_REFUSALS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Read all counters.
#[must_use]
pub fn hash_join_metrics_snapshot() -> HashJoinMetricsSnapshot {
    HashJoinMetricsSnapshot {
        vecjoin_build_rows_total: BUILD_ROWS_TOTAL.load(Ordering::Relaxed),
        vecjoin_probe_batches_total: PROBE_BATCHES_TOTAL.load(Ordering::Relaxed),
        vecjoin_probe_rows_total: PROBE_ROWS_TOTAL.load(Ordering::Relaxed),
        vecjoin_chain_rounds_total: CHAIN_ROUNDS_TOTAL.load(Ordering::Relaxed),
        vecjoin_output_batches_total: OUTPUT_BATCHES_TOTAL.load(Ordering::Relaxed),
        vecjoin_output_rows_total: OUTPUT_ROWS_TOTAL.load(Ordering::Relaxed),
        vecjoin_resumed_collections_total: RESUMED_COLLECTIONS_TOTAL.load(Ordering::Relaxed),
        vecjoin_emit_right_rows_total: EMIT_RIGHT_ROWS_TOTAL.load(Ordering::Relaxed),
        vecjoin_memory_limit_refusals_total: MEMORY_LIMIT_REFUSALS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Zero all counters.
pub fn reset_hash_join_metrics() {
    for counter in [
        &BUILD_ROWS_TOTAL,
        &PROBE_BATCHES_TOTAL,
        &PROBE_ROWS_TOTAL,
        &CHAIN_ROUNDS_TOTAL,
        &OUTPUT_BATCHES_TOTAL,
        &OUTPUT_ROWS_TOTAL,
        &RESUMED_COLLECTIONS_TOTAL,
        &EMIT_RIGHT_ROWS_TOTAL,
        &MEMORY_LIMIT_REFUSALS_TOTAL,
    ] {
        counter.store(0, Ordering::Relaxed);
    }
}
