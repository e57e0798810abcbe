//! Vectorized hash join operator.
//!
//! The right input is drained into a [`HashTable`], then the left input is
//! probed against it one batch at a time. Joins that need to know which
//! build rows were matched finish with an emit-right phase that streams the
//! build rows in table order.
//!
//! ```text
//! Building ──► Probing ──► EmittingRight ──► Done
//!     │            │                          ▲
//!     └────────────┴──────────────────────────┘
//! ```

use vecjoin_error::{Result, VecJoinError};
use vecjoin_types::{Batch, Column, ColumnSpec, Cx};

use crate::collect::collect;
use crate::config::HashJoinConfig;
use crate::hash_table::{HashTable, check_schema};
use crate::join_type::{CollectMode, JoinBehavior};
use crate::memory::Allocator;
use crate::metrics;
use crate::operator::{BufferingInMemoryOperator, InputSide, Operator};
use crate::probe_scratch::{ProbeScratch, ProbeState};
use crate::spec::HashJoinerSpec;

/// Phase of a [`HashJoiner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashJoinerState {
    /// Draining the right input into the hash table.
    Building,
    /// Pulling left batches and emitting joined rows.
    Probing,
    /// Streaming matched or unmatched build rows.
    EmittingRight,
    /// Exhausted; every pull returns an empty batch.
    Done,
}

/// Hash join over a probe (left) input `L` and a build (right) input `R`.
#[derive(Debug)]
pub struct HashJoiner<L, R> {
    spec: HashJoinerSpec,
    behavior: JoinBehavior,
    config: HashJoinConfig,
    left: L,
    right: R,
    output_specs: Vec<ColumnSpec>,

    state: HashJoinerState,
    table: HashTable,
    scratch: ProbeScratch,
    probe_state: Option<ProbeState>,
    emitting_right_idx: usize,
    exported_rows: usize,

    build_allocator: Allocator,
    output_allocator: Allocator,
    /// Bytes of the last output batch charged to `output_allocator`.
    output_bytes: usize,
}

fn check_input_schema(side: &str, expected: &[ColumnSpec], actual: &[ColumnSpec]) -> Result<()> {
    let same_types = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| e.vector_type == a.vector_type);
    if same_types {
        Ok(())
    } else {
        Err(VecJoinError::invalid_spec(format!(
            "{side} input schema does not match the join specification"
        )))
    }
}

impl<L: Operator, R: Operator> HashJoiner<L, R> {
    /// Create a joiner with explicit allocators.
    ///
    /// # Errors
    ///
    /// [`VecJoinError::InvalidSpec`] for an invalid config, a bounded
    /// `output_allocator`, or inputs whose schema differs from `spec`.
    pub fn try_new(
        spec: HashJoinerSpec,
        config: HashJoinConfig,
        left: L,
        right: R,
        build_allocator: Allocator,
        output_allocator: Allocator,
    ) -> Result<Self> {
        config.validate()?;
        if output_allocator.is_bounded() {
            return Err(VecJoinError::invalid_spec(
                "output allocator must be unbounded",
            ));
        }
        check_input_schema("left", &spec.left().columns, left.schema())?;
        check_input_schema("right", &spec.right().columns, right.schema())?;

        let behavior = spec.behavior();
        let table = HashTable::new(
            spec.right().columns.clone(),
            &spec.right().eq_cols,
            &config,
            &behavior,
        );
        let output_specs = spec.output_specs();
        tracing::debug!(
            join_type = %spec.join_type(),
            right_distinct = behavior.right_distinct,
            max_batch_size = config.max_batch_size,
            "hash joiner created"
        );
        Ok(Self {
            spec,
            behavior,
            config,
            left,
            right,
            output_specs,
            state: HashJoinerState::Building,
            table,
            scratch: ProbeScratch::new(),
            probe_state: None,
            emitting_right_idx: 0,
            exported_rows: 0,
            build_allocator,
            output_allocator,
            output_bytes: 0,
        })
    }

    /// Create a joiner whose allocators follow `config`.
    ///
    /// # Errors
    ///
    /// See [`HashJoiner::try_new`].
    pub fn with_config(spec: HashJoinerSpec, config: HashJoinConfig, left: L, right: R) -> Result<Self> {
        let build_allocator = match config.build_memory_limit_bytes {
            Some(limit) => Allocator::bounded("hash-join-build", limit),
            None => Allocator::unbounded("hash-join-build"),
        };
        let output_allocator = Allocator::unbounded("hash-join-output");
        Self::try_new(spec, config, left, right, build_allocator, output_allocator)
    }

    #[must_use]
    pub const fn state(&self) -> HashJoinerState {
        self.state
    }

    #[must_use]
    pub const fn spec(&self) -> &HashJoinerSpec {
        &self.spec
    }

    #[must_use]
    pub const fn behavior(&self) -> &JoinBehavior {
        &self.behavior
    }

    #[must_use]
    pub const fn config(&self) -> &HashJoinConfig {
        &self.config
    }

    /// Rows buffered in the hash table.
    #[must_use]
    pub const fn build_row_count(&self) -> usize {
        self.table.num_rows()
    }

    #[must_use]
    pub const fn num_buckets(&self) -> usize {
        self.table.num_buckets()
    }

    #[must_use]
    pub const fn build_memory_used(&self) -> usize {
        self.build_allocator.used()
    }

    #[must_use]
    pub const fn output_memory_used(&self) -> usize {
        self.output_allocator.used()
    }

    #[must_use]
    pub const fn left_input(&self) -> &L {
        &self.left
    }

    #[must_use]
    pub const fn right_input(&self) -> &R {
        &self.right
    }

    fn transition(&mut self, next: HashJoinerState) {
        tracing::debug!(from = ?self.state, to = ?next, "hash joiner state transition");
        self.state = next;
    }

    fn build_failure(&self, err: VecJoinError) -> VecJoinError {
        if err.is_memory_limit() {
            metrics::record_memory_limit_refusal();
            tracing::warn!(
                buffered_rows = self.table.num_rows(),
                used = self.build_allocator.used(),
                error = %err,
                "hash join build refused memory"
            );
        }
        err
    }

    fn build(&mut self, cx: &Cx) -> Result<()> {
        let _span = tracing::debug_span!("hash_join_build", join_type = %self.spec.join_type())
            .entered();
        self.table
            .full_build(cx, &mut self.right, &mut self.build_allocator)
            .map_err(|err| self.build_failure(err))?;

        let rows = self.table.num_rows();
        if rows == 0 && self.spec.join_type().is_empty_output_when_right_is_empty() {
            tracing::debug!("empty build side, skipping probe input");
            self.transition(HashJoinerState::Done);
            return Ok(());
        }

        self.table
            .prepare_for_probing(self.behavior.needs_same_key_chain, self.behavior.needs_visited);
        self.table
            .charge(&mut self.build_allocator)
            .map_err(|err| self.build_failure(err))?;
        if self.behavior.track_build_matches {
            self.scratch.reset_build_matches(rows);
        }
        metrics::record_build(rows);
        tracing::info!(
            rows,
            buckets = self.table.num_buckets(),
            bytes = self.build_allocator.used(),
            "hash join build complete"
        );
        self.transition(HashJoinerState::Probing);
        Ok(())
    }

    /// Produce the next probe-phase batch, or `None` once the left input is
    /// exhausted.
    fn exec(&mut self, cx: &Cx) -> Result<Option<Batch>> {
        let max = self.config.max_batch_size;
        loop {
            cx.checkpoint()?;
            if let Some(state) = self.probe_state.take() {
                metrics::record_resumed_collection();
                let collected = collect(
                    &mut self.scratch,
                    self.table.same(),
                    self.behavior.collect,
                    state.prev_batch_resume_idx,
                    max,
                );
                let out = self.congregate(&state.prev_batch, collected.n_results)?;
                if let Some(resume) = collected.resume_idx {
                    self.probe_state = Some(ProbeState {
                        prev_batch: state.prev_batch,
                        prev_batch_resume_idx: resume,
                    });
                }
                if collected.n_results > 0 {
                    return Ok(Some(out));
                }
                continue;
            }

            let batch = self.left.next_batch(cx)?;
            if batch.is_empty() {
                let next = if self.behavior.track_build_matches {
                    HashJoinerState::EmittingRight
                } else {
                    HashJoinerState::Done
                };
                self.transition(next);
                return Ok(None);
            }
            check_schema("probe", &self.spec.left().columns, &batch)?;

            let _span = tracing::debug_span!("hash_join_probe", rows = batch.len()).entered();
            let rounds = self.table.probe_batch(
                cx,
                &batch,
                &self.spec.left().eq_cols,
                &self.behavior,
                &mut self.scratch,
            )?;
            metrics::record_probe_batch(batch.len(), rounds);

            let collected = collect(&mut self.scratch, self.table.same(), self.behavior.collect, 0, max);
            if collected.n_results == 0 && collected.resume_idx.is_none() {
                continue;
            }
            let out = self.congregate(&batch, collected.n_results)?;
            if let Some(resume) = collected.resume_idx {
                self.probe_state = Some(ProbeState {
                    prev_batch: batch,
                    prev_batch_resume_idx: resume,
                });
            }
            if collected.n_results > 0 {
                return Ok(Some(out));
            }
        }
    }

    /// Stitch the collected index lists into an output batch.
    fn congregate(&mut self, batch: &Batch, n: usize) -> Result<Batch> {
        let mut columns = Vec::with_capacity(self.output_specs.len());
        let mut specs = self.output_specs.iter().cloned();
        if self.behavior.include_left {
            for (src, spec) in batch.columns().iter().zip(specs.by_ref()) {
                let mut out = Column::with_capacity(spec, n);
                out.extend_from(src, self.scratch.probe_idx.iter().copied())?;
                columns.push(out);
            }
        }
        if self.behavior.include_right {
            self.scratch.build_rows.clear();
            self.scratch
                .build_rows
                .extend(self.scratch.build_idx.iter().map(|&id| id.saturating_sub(1)));
            for (src, spec) in self.table.columns().iter().zip(specs.by_ref()) {
                let mut out = Column::with_capacity(spec, n);
                out.gather_masked(src, &self.scratch.build_rows, &self.scratch.probe_row_unmatched)?;
                columns.push(out);
            }
        }
        if self.behavior.track_build_matches
            && matches!(self.behavior.collect, CollectMode::Pairs { .. })
        {
            for (&id, &unmatched) in self
                .scratch
                .build_idx
                .iter()
                .zip(&self.scratch.probe_row_unmatched)
            {
                if !unmatched {
                    self.scratch.build_row_matched[id - 1] = true;
                }
            }
        }
        let out = Batch::from_columns(columns, n)?;
        self.finish_output(out)
    }

    /// Produce the next emit-right batch, or `None` once every build row has
    /// been scanned.
    fn emit_right(&mut self, cx: &Cx) -> Result<Option<Batch>> {
        cx.checkpoint()?;
        let wanted = self.behavior.emit_right_matched;
        let max = self.config.max_batch_size;
        let total = self.scratch.build_row_matched.len();
        self.scratch.build_rows.clear();
        while self.emitting_right_idx < total && self.scratch.build_rows.len() < max {
            if self.scratch.build_row_matched[self.emitting_right_idx] == wanted {
                self.scratch.build_rows.push(self.emitting_right_idx);
            }
            self.emitting_right_idx += 1;
        }
        let n = self.scratch.build_rows.len();
        if n == 0 {
            self.transition(HashJoinerState::Done);
            return Ok(None);
        }

        let _span = tracing::debug_span!("hash_join_emit_right", rows = n).entered();
        let mut columns = Vec::with_capacity(self.output_specs.len());
        let mut specs = self.output_specs.iter().cloned();
        if self.behavior.include_left {
            for spec in specs.by_ref().take(self.spec.left().columns.len()) {
                let mut out = Column::with_capacity(spec, n);
                out.extend_nulls(n)?;
                columns.push(out);
            }
        }
        for (src, spec) in self.table.columns().iter().zip(specs) {
            let mut out = Column::with_capacity(spec, n);
            out.extend_from(src, self.scratch.build_rows.iter().copied())?;
            columns.push(out);
        }
        metrics::record_emit_right(n);
        let out = Batch::from_columns(columns, n)?;
        self.finish_output(out).map(Some)
    }

    fn finish_output(&mut self, batch: Batch) -> Result<Batch> {
        let size = batch.byte_size();
        self.output_allocator.adjust(self.output_bytes, size)?;
        self.output_bytes = size;
        metrics::record_output_batch(batch.len());
        Ok(batch)
    }
}

impl<L: Operator, R: Operator> Operator for HashJoiner<L, R> {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()
    }

    fn next_batch(&mut self, cx: &Cx) -> Result<Batch> {
        loop {
            match self.state {
                HashJoinerState::Building => self.build(cx)?,
                HashJoinerState::Probing => {
                    if let Some(out) = self.exec(cx)? {
                        return Ok(out);
                    }
                }
                HashJoinerState::EmittingRight => {
                    if let Some(out) = self.emit_right(cx)? {
                        return Ok(out);
                    }
                }
                HashJoinerState::Done => {
                    self.output_allocator.release(self.output_bytes);
                    self.output_bytes = 0;
                    return Ok(Batch::empty(&self.output_specs));
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        tracing::debug!(
            buffered_rows = self.table.num_rows(),
            state = ?self.state,
            "hash joiner reset"
        );
        self.left.reset()?;
        self.right.reset()?;
        self.table.reset(&mut self.build_allocator);
        self.build_allocator.release_all();
        self.scratch.reset();
        self.probe_state = None;
        self.emitting_right_idx = 0;
        self.exported_rows = 0;
        self.output_allocator.release_all();
        self.output_bytes = 0;
        self.transition(HashJoinerState::Building);
        Ok(())
    }

    fn schema(&self) -> &[ColumnSpec] {
        &self.output_specs
    }
}

impl<L: Operator, R: Operator> BufferingInMemoryOperator for HashJoiner<L, R> {
    /// Build rows are exported in windows of `max_batch_size` rows. The left
    /// input is never buffered, since no probe row is pulled before the build
    /// side is complete.
    fn export_buffered(&mut self, side: InputSide) -> Result<Batch> {
        match side {
            InputSide::Left => Ok(Batch::zero()),
            InputSide::Right => {
                let total = self.table.num_rows();
                if self.exported_rows >= total {
                    return Ok(Batch::zero());
                }
                let end = (self.exported_rows + self.config.max_batch_size).min(total);
                let window = self.table.window(self.exported_rows, end)?;
                tracing::debug!(start = self.exported_rows, end, "exporting buffered build rows");
                self.exported_rows = end;
                Ok(window)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_type::JoinType;
    use crate::operator::BatchSource;
    use vecjoin_types::{ColumnVectorType, Value};

    fn specs(prefix: &str) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new(format!("{prefix}_k"), ColumnVectorType::Int64),
            ColumnSpec::new(format!("{prefix}_v"), ColumnVectorType::Text),
        ]
    }

    fn rows(data: &[(Option<i64>, &str)]) -> Vec<Vec<Value>> {
        data.iter()
            .map(|&(k, v)| vec![Value::from(k), Value::from(v)])
            .collect()
    }

    fn source(prefix: &str, data: &[(Option<i64>, &str)], chunk: usize) -> BatchSource {
        BatchSource::from_rows(specs(prefix), &rows(data), chunk).unwrap()
    }

    fn joiner(
        join_type: JoinType,
        left: &[(Option<i64>, &str)],
        right: &[(Option<i64>, &str)],
        config: HashJoinConfig,
    ) -> HashJoiner<BatchSource, BatchSource> {
        let spec =
            HashJoinerSpec::new(join_type, &[0], &[0], specs("l"), specs("r"), false).unwrap();
        HashJoiner::with_config(spec, config, source("l", left, 2), source("r", right, 2)).unwrap()
    }

    fn drain<L: Operator, R: Operator>(joiner: &mut HashJoiner<L, R>) -> Vec<Vec<Value>> {
        let cx = Cx::new();
        joiner.init().unwrap();
        let mut out = Vec::new();
        loop {
            let batch = joiner.next_batch(&cx).unwrap();
            assert!(batch.len() <= joiner.config().max_batch_size);
            if batch.is_empty() {
                break;
            }
            out.extend(batch.materialize_rows().unwrap());
        }
        out.sort_by(|a, b| {
            a.iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    fn v(k: Option<i64>, s: &str) -> [Value; 2] {
        [Value::from(k), Value::from(s)]
    }

    fn row(parts: &[[Value; 2]]) -> Vec<Value> {
        parts.iter().flat_map(|p| p.iter().cloned()).collect()
    }

    const BUILD: &[(Option<i64>, &str)] = &[(Some(1), "a"), (Some(2), "b"), (Some(2), "c")];
    const PROBE: &[(Option<i64>, &str)] = &[(Some(2), "x"), (Some(3), "y")];

    #[test]
    fn inner_join_pairs_every_duplicate() {
        let mut j = joiner(JoinType::Inner, PROBE, BUILD, HashJoinConfig::default());
        assert_eq!(
            drain(&mut j),
            vec![
                row(&[v(Some(2), "x"), v(Some(2), "b")]),
                row(&[v(Some(2), "x"), v(Some(2), "c")]),
            ]
        );
        assert_eq!(j.state(), HashJoinerState::Done);
    }

    #[test]
    fn left_outer_pads_unmatched_probe_rows() {
        let mut j = joiner(JoinType::LeftOuter, PROBE, BUILD, HashJoinConfig::default());
        let out = drain(&mut j);
        assert_eq!(out.len(), 3);
        assert!(out.contains(&row(&[v(Some(3), "y"), [Value::Null, Value::Null]])));
    }

    #[test]
    fn full_outer_emits_unmatched_build_rows() {
        let mut j = joiner(JoinType::FullOuter, PROBE, BUILD, HashJoinConfig::default());
        let out = drain(&mut j);
        assert_eq!(out.len(), 4);
        assert!(out.contains(&row(&[[Value::Null, Value::Null], v(Some(1), "a")])));
        assert!(out.contains(&row(&[v(Some(3), "y"), [Value::Null, Value::Null]])));
    }

    #[test]
    fn right_semi_and_anti() {
        let probe = &[(Some(2), "x"), (Some(2), "z"), (Some(3), "y")];
        let mut semi = joiner(JoinType::RightSemi, probe, BUILD, HashJoinConfig::default());
        assert_eq!(
            drain(&mut semi),
            vec![v(Some(2), "b").to_vec(), v(Some(2), "c").to_vec()]
        );
        let mut anti = joiner(JoinType::RightAnti, probe, BUILD, HashJoinConfig::default());
        assert_eq!(drain(&mut anti), vec![v(Some(1), "a").to_vec()]);
    }

    #[test]
    fn right_semi_and_anti_carry_build_columns() {
        let build = &[(Some(1), "a"), (Some(2), "b")];
        let probe = &[(Some(2), "x")];
        let cx = Cx::new();
        for (join_type, expected) in [
            (JoinType::RightSemi, v(Some(2), "b")),
            (JoinType::RightAnti, v(Some(1), "a")),
        ] {
            let mut j = joiner(join_type, probe, build, HashJoinConfig::default());
            assert_eq!(j.schema(), specs("r").as_slice(), "{join_type}");
            j.init().unwrap();
            let batch = j.next_batch(&cx).unwrap();
            assert_eq!(batch.len(), 1, "{join_type}");
            assert_eq!(batch.columns().len(), 2, "{join_type}");
            assert_eq!(batch.materialize_rows().unwrap(), vec![expected.to_vec()]);
        }
    }

    #[test]
    fn left_semi_and_anti() {
        let mut semi = joiner(JoinType::LeftSemi, PROBE, BUILD, HashJoinConfig::default());
        assert_eq!(drain(&mut semi), vec![v(Some(2), "x").to_vec()]);
        let mut anti = joiner(JoinType::LeftAnti, PROBE, BUILD, HashJoinConfig::default());
        assert_eq!(drain(&mut anti), vec![v(Some(3), "y").to_vec()]);
    }

    #[test]
    fn set_operations_count_multiplicity_and_match_nulls() {
        let left = &[(Some(2), "p"), (Some(2), "q"), (Some(2), "r"), (None, "n")];
        let right = &[(Some(2), "b"), (Some(2), "c"), (None, "m")];
        let mut intersect = joiner(JoinType::IntersectAll, left, right, HashJoinConfig::default());
        let out = drain(&mut intersect);
        assert_eq!(out.len(), 3);
        assert!(out.contains(&v(None, "n").to_vec()));

        let mut except = joiner(JoinType::ExceptAll, left, right, HashJoinConfig::default());
        let out = drain(&mut except);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], Value::Integer(2));
    }

    #[test]
    fn oversized_match_sets_resume_across_pulls() {
        let build: Vec<(Option<i64>, &str)> = (0..7).map(|_| (Some(4), "d")).collect();
        let probe = &[(Some(4), "x"), (Some(5), "y"), (Some(4), "z")];
        let mut expected = joiner(JoinType::LeftOuter, probe, &build, HashJoinConfig::default());
        let expected = drain(&mut expected);
        assert_eq!(expected.len(), 15);

        let before = metrics::hash_join_metrics_snapshot();
        let config = HashJoinConfig::default().with_max_batch_size(3);
        let mut small = joiner(JoinType::LeftOuter, probe, &build, config);
        assert_eq!(drain(&mut small), expected);
        let after = metrics::hash_join_metrics_snapshot();
        assert!(after.vecjoin_resumed_collections_total > before.vecjoin_resumed_collections_total);
    }

    #[test]
    fn empty_build_skips_probe_input() {
        let mut j = joiner(JoinType::Inner, PROBE, &[], HashJoinConfig::default());
        assert!(drain(&mut j).is_empty());
        assert_eq!(j.left_input().pull_count(), 0);
        assert_eq!(j.state(), HashJoinerState::Done);

        let mut outer = joiner(JoinType::LeftOuter, PROBE, &[], HashJoinConfig::default());
        assert_eq!(drain(&mut outer).len(), 2);
    }

    #[test]
    fn empty_probe_yields_only_right_tail() {
        let mut right_outer = joiner(JoinType::RightOuter, &[], BUILD, HashJoinConfig::default());
        assert_eq!(drain(&mut right_outer).len(), 3);
        let mut inner = joiner(JoinType::Inner, &[], BUILD, HashJoinConfig::default());
        assert!(drain(&mut inner).is_empty());
    }

    #[test]
    fn done_stays_done() {
        let mut j = joiner(JoinType::Inner, PROBE, BUILD, HashJoinConfig::default());
        drain(&mut j);
        let cx = Cx::new();
        for _ in 0..3 {
            let batch = j.next_batch(&cx).unwrap();
            assert!(batch.is_empty());
            assert_eq!(batch.specs().len(), 4);
        }
    }

    #[test]
    fn reset_reproduces_output() {
        let mut j = joiner(JoinType::FullOuter, PROBE, BUILD, HashJoinConfig::default());
        let first = drain(&mut j);
        j.reset().unwrap();
        assert_eq!(j.state(), HashJoinerState::Building);
        assert_eq!(j.build_row_count(), 0);
        assert_eq!(drain(&mut j), first);
    }

    #[test]
    fn memory_limit_keeps_rows_for_export() {
        let build: Vec<(Option<i64>, &str)> = (0..50).map(|k| (Some(k), "payload")).collect();
        let config = HashJoinConfig::default()
            .with_build_memory_limit(256)
            .with_max_batch_size(4);
        let mut j = joiner(JoinType::Inner, PROBE, &build, config);
        let err = j.next_batch(&Cx::new()).unwrap_err();
        assert!(err.is_memory_limit());
        assert_eq!(j.state(), HashJoinerState::Building);
        assert_eq!(j.left_input().pull_count(), 0);

        let buffered = j.build_row_count();
        assert!(buffered > 0);
        assert!(j.export_buffered(InputSide::Left).unwrap().is_empty());
        let mut exported = 0;
        loop {
            let window = j.export_buffered(InputSide::Right).unwrap();
            if window.is_empty() {
                break;
            }
            assert!(window.len() <= 4);
            exported += window.len();
        }
        assert_eq!(exported, buffered);
        assert!(j.export_buffered(InputSide::Right).unwrap().is_empty());
    }

    #[test]
    fn bounded_output_allocator_is_rejected() {
        let spec =
            HashJoinerSpec::new(JoinType::Inner, &[0], &[0], specs("l"), specs("r"), false).unwrap();
        let err = HashJoiner::try_new(
            spec,
            HashJoinConfig::default(),
            source("l", PROBE, 2),
            source("r", BUILD, 2),
            Allocator::unbounded("build"),
            Allocator::bounded("output", 1 << 20),
        )
        .unwrap_err();
        assert!(matches!(err, VecJoinError::InvalidSpec(_)));
    }

    #[test]
    fn cancellation_aborts_pull() {
        let mut j = joiner(JoinType::Inner, PROBE, BUILD, HashJoinConfig::default());
        let cx = Cx::new();
        cx.cancel();
        assert_eq!(j.next_batch(&cx), Err(VecJoinError::Cancelled));
        assert_eq!(j.state(), HashJoinerState::Building);
    }

    #[test]
    fn output_memory_is_charged_and_released() {
        let mut j = joiner(JoinType::Inner, PROBE, BUILD, HashJoinConfig::default());
        let cx = Cx::new();
        let batch = j.next_batch(&cx).unwrap();
        assert!(!batch.is_empty());
        assert_eq!(j.output_memory_used(), batch.byte_size());
        assert!(j.build_memory_used() > 0);
        while !j.next_batch(&cx).unwrap().is_empty() {}
        assert_eq!(j.output_memory_used(), 0);
    }

    #[test]
    fn probe_schema_mismatch_is_internal() {
        let spec =
            HashJoinerSpec::new(JoinType::Inner, &[0], &[0], specs("l"), specs("r"), false).unwrap();
        let wrong = vec![
            ColumnSpec::new("l_k", ColumnVectorType::Int64),
            ColumnSpec::new("l_v", ColumnVectorType::Binary),
        ];
        let bad_batch = vecjoin_types::Batch::from_rows(
            &[vec![Value::Integer(1), Value::Blob(vec![1])]],
            &wrong,
            1,
        )
        .unwrap();
        // The source advertises the expected schema but hands out a mismatched batch.
        let left = BatchSource::new(specs("l"), vec![bad_batch]);
        let mut j =
            HashJoiner::with_config(spec, HashJoinConfig::default(), left, source("r", BUILD, 2))
                .unwrap();
        let err = j.next_batch(&Cx::new()).unwrap_err();
        assert!(matches!(err, VecJoinError::Internal(_)));
    }
}
