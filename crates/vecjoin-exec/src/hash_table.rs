//! Bucket-chain hash table over materialized build rows.
//!
//! Stored rows are addressed by 1-based ids; id 0 is the "no row" sentinel
//! in every index array, so `next[0]` is always 0 and `visited[0]` is always
//! set. `first[bucket]` heads the chain of rows hashing into `bucket`, and
//! `next[id]` links to the next row of the same chain.
//!
//! Probing is vectorized: a whole probe batch walks its chains in lockstep
//! rounds driven by the `to_check` list of [`ProbeScratch`].

use vecjoin_error::{Result, VecJoinError};
use vecjoin_types::{Batch, Column, ColumnData, ColumnSpec, Cx};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::HashJoinConfig;
use crate::join_type::{JoinBehavior, ProbeMode};
use crate::memory::Allocator;
use crate::operator::Operator;
use crate::probe_scratch::ProbeScratch;

const HASH_SEED: u64 = 0x5bd1_e995_2c1b_3c6d;
const NULL_HASH_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

// ── Hashing ────────────────────────────────────────────────────────────────

/// Hash the equality columns of `rows`, one column at a time, chaining each
/// column's hash into the seed of the next. `has_null` records rows with a
/// NULL in any equality column.
pub(crate) fn hash_key_columns(
    columns: &[Column],
    eq_cols: &[usize],
    rows: &[usize],
    hashes: &mut Vec<u64>,
    has_null: &mut Vec<bool>,
) -> Result<()> {
    hashes.clear();
    hashes.resize(rows.len(), HASH_SEED);
    has_null.clear();
    has_null.resize(rows.len(), false);
    for &col_idx in eq_cols {
        let column = columns.get(col_idx).ok_or_else(|| {
            VecJoinError::internal(format!("equality column {col_idx} missing from batch"))
        })?;
        match &column.data {
            ColumnData::Bool(v) => hash_fixed(column, rows, hashes, has_null, |row| {
                [u8::from(v[row])]
            }),
            ColumnData::Int32(v) => hash_fixed(column, rows, hashes, has_null, |row| {
                i64::from(v[row]).to_le_bytes()
            }),
            ColumnData::Int64(v) => {
                hash_fixed(column, rows, hashes, has_null, |row| v[row].to_le_bytes());
            }
            ColumnData::Float64(v) => hash_fixed(column, rows, hashes, has_null, |row| {
                normalize_f64(v[row]).to_bits().to_le_bytes()
            }),
            ColumnData::Text { offsets, data } | ColumnData::Binary { offsets, data } => {
                for (pos, &row) in rows.iter().enumerate() {
                    hashes[pos] = if column.validity.is_valid(row) {
                        let bytes = &data[offsets[row] as usize..offsets[row + 1] as usize];
                        xxh3_64_with_seed(bytes, hashes[pos])
                    } else {
                        has_null[pos] = true;
                        null_hash(hashes[pos])
                    };
                }
            }
        }
    }
    Ok(())
}

fn hash_fixed<const N: usize>(
    column: &Column,
    rows: &[usize],
    hashes: &mut [u64],
    has_null: &mut [bool],
    bytes_of: impl Fn(usize) -> [u8; N],
) {
    for (pos, &row) in rows.iter().enumerate() {
        hashes[pos] = if column.validity.is_valid(row) {
            xxh3_64_with_seed(&bytes_of(row), hashes[pos])
        } else {
            has_null[pos] = true;
            null_hash(hashes[pos])
        };
    }
}

#[inline]
fn null_hash(seed: u64) -> u64 {
    xxh3_64_with_seed(&NULL_HASH_MIX.to_le_bytes(), seed)
}

/// Map `-0.0` to `0.0` and every NaN to one NaN so equal keys hash alike.
#[inline]
fn normalize_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

// ── Key comparison ─────────────────────────────────────────────────────────

/// Rows taking part in one comparison round.
struct CheckRows<'a> {
    to_check: &'a [usize],
    probe_rows: &'a [usize],
    key_ids: &'a [usize],
    null_equality: bool,
}

/// Set `differs[i]` for every row of `rows.to_check` whose probe value in
/// this column differs from the build value of its candidate. Candidate id 0
/// always differs.
fn mark_column_differs(
    probe: &Column,
    build: &Column,
    rows: &CheckRows<'_>,
    differs: &mut [bool],
) -> Result<()> {
    match (&probe.data, &build.data) {
        (ColumnData::Bool(p), ColumnData::Bool(b)) => {
            mark_fixed(probe, build, p, b, rows, differs, |x, y| x == y);
        }
        (ColumnData::Int32(p), ColumnData::Int32(b)) => {
            mark_fixed(probe, build, p, b, rows, differs, |x, y| x == y);
        }
        (ColumnData::Int64(p), ColumnData::Int64(b)) => {
            mark_fixed(probe, build, p, b, rows, differs, |x, y| x == y);
        }
        (ColumnData::Float64(p), ColumnData::Float64(b)) => {
            mark_fixed(probe, build, p, b, rows, differs, |x, y| {
                x == y || (x.is_nan() && y.is_nan())
            });
        }
        (
            ColumnData::Text {
                offsets: po,
                data: pd,
            },
            ColumnData::Text {
                offsets: bo,
                data: bd,
            },
        )
        | (
            ColumnData::Binary {
                offsets: po,
                data: pd,
            },
            ColumnData::Binary {
                offsets: bo,
                data: bd,
            },
        ) => {
            for &i in rows.to_check {
                let key = rows.key_ids[i];
                if key == 0 {
                    differs[i] = true;
                    continue;
                }
                let (pr, br) = (rows.probe_rows[i], key - 1);
                let equal = match (probe.validity.is_valid(pr), build.validity.is_valid(br)) {
                    (true, true) => {
                        pd[po[pr] as usize..po[pr + 1] as usize]
                            == bd[bo[br] as usize..bo[br + 1] as usize]
                    }
                    (false, false) => rows.null_equality,
                    _ => false,
                };
                if !equal {
                    differs[i] = true;
                }
            }
        }
        (p, b) => {
            return Err(VecJoinError::internal(format!(
                "cannot compare {} probe column with {} build column",
                p.vector_type(),
                b.vector_type()
            )));
        }
    }
    Ok(())
}

fn mark_fixed<T>(
    probe: &Column,
    build: &Column,
    p: &[T],
    b: &[T],
    rows: &CheckRows<'_>,
    differs: &mut [bool],
    eq: impl Fn(&T, &T) -> bool,
) {
    for &i in rows.to_check {
        let key = rows.key_ids[i];
        if key == 0 {
            differs[i] = true;
            continue;
        }
        let (pr, br) = (rows.probe_rows[i], key - 1);
        let equal = match (probe.validity.is_valid(pr), build.validity.is_valid(br)) {
            (true, true) => eq(&p[pr], &b[br]),
            (false, false) => rows.null_equality,
            _ => false,
        };
        if !equal {
            differs[i] = true;
        }
    }
}

// ── Table ──────────────────────────────────────────────────────────────────

/// Power-of-two bucket count for `rows` rows: `initial` doubled while the
/// load exceeds `load_factor`. Never exceeds eight buckets per row, so a
/// degenerate load factor cannot overflow the count.
fn bucket_count(rows: usize, initial: usize, load_factor: f64) -> usize {
    let limit = rows
        .saturating_mul(8)
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
        .max(initial);
    let mut num_buckets = initial;
    while num_buckets < limit && rows as f64 / num_buckets as f64 > load_factor {
        num_buckets *= 2;
    }
    num_buckets
}

/// Materialized build side plus its bucket chains.
#[derive(Debug)]
pub struct HashTable {
    specs: Vec<ColumnSpec>,
    eq_cols: Vec<usize>,
    columns: Vec<Column>,
    num_rows: usize,

    initial_num_buckets: usize,
    load_factor: f64,
    num_buckets: usize,
    first: Vec<usize>,
    next: Vec<usize>,
    /// Links build rows with identical keys, starting at the head found by
    /// the first probe of that key.
    same: Vec<usize>,
    visited: Vec<bool>,

    null_equality: bool,
    probe_mode: ProbeMode,
    /// Bytes already charged to the build allocator.
    charged_bytes: usize,
}

impl HashTable {
    #[must_use]
    pub fn new(
        specs: Vec<ColumnSpec>,
        eq_cols: &[usize],
        config: &HashJoinConfig,
        behavior: &JoinBehavior,
    ) -> Self {
        let columns = specs
            .iter()
            .map(|spec| Column::with_capacity(spec.clone(), 0))
            .collect();
        let initial_num_buckets = config.normalized_initial_buckets();
        Self {
            specs,
            eq_cols: eq_cols.to_vec(),
            columns,
            num_rows: 0,
            initial_num_buckets,
            load_factor: config.load_factor,
            num_buckets: initial_num_buckets,
            first: vec![0; initial_num_buckets],
            next: vec![0],
            same: Vec::new(),
            visited: Vec::new(),
            null_equality: behavior.null_equality,
            probe_mode: behavior.probe_mode,
            charged_bytes: 0,
        }
    }

    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub const fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn specs(&self) -> &[ColumnSpec] {
        &self.specs
    }

    #[must_use]
    pub fn first(&self) -> &[usize] {
        &self.first
    }

    #[must_use]
    pub fn next(&self) -> &[usize] {
        &self.next
    }

    /// Same-key chain; empty when not allocated.
    #[must_use]
    pub fn same(&self) -> &[usize] {
        &self.same
    }

    #[must_use]
    pub fn visited(&self) -> &[bool] {
        &self.visited
    }

    /// Approximate heap footprint of stored rows and index arrays.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        let columns: usize = self.columns.iter().map(Column::byte_size).sum();
        let ids = (self.first.len() + self.next.len() + self.same.len()) * size_of::<usize>();
        columns + ids + self.visited.len()
    }

    /// Charge growth since the last successful charge. A refused charge
    /// leaves the rows buffered and is retried by the next call.
    pub(crate) fn charge(&mut self, allocator: &mut Allocator) -> Result<()> {
        let size = self.byte_size();
        allocator.adjust(self.charged_bytes, size)?;
        self.charged_bytes = size;
        Ok(())
    }

    /// Drain `input` into the table and build the bucket chains.
    ///
    /// # Errors
    ///
    /// Returns [`VecJoinError::MemoryLimitExceeded`] when `allocator` refuses
    /// growth; the rows read so far stay buffered and a later call resumes
    /// pulling. Interrupts and input failures are propagated.
    pub fn full_build<O: Operator + ?Sized>(
        &mut self,
        cx: &Cx,
        input: &mut O,
        allocator: &mut Allocator,
    ) -> Result<()> {
        loop {
            cx.checkpoint()?;
            let batch = input.next_batch(cx)?;
            if batch.is_empty() {
                break;
            }
            self.append_batch(&batch)?;
            self.charge(allocator)?;
        }
        self.build_from_buffered_tuples()?;
        self.charge(allocator)
    }

    /// Append the logical rows of `batch` to the stored columns.
    ///
    /// # Errors
    ///
    /// Returns [`VecJoinError::Internal`] when the batch does not match the
    /// build schema.
    pub fn append_batch(&mut self, batch: &Batch) -> Result<()> {
        check_schema("build", &self.specs, batch)?;
        let rows: Vec<usize> = (0..batch.len()).map(|i| batch.physical_index(i)).collect();
        for (dst, src) in self.columns.iter_mut().zip(batch.columns()) {
            dst.extend_from(src, rows.iter().copied())?;
        }
        self.num_rows += rows.len();
        Ok(())
    }

    /// Size the bucket array for the buffered rows and thread every row into
    /// its bucket chain.
    pub fn build_from_buffered_tuples(&mut self) -> Result<()> {
        self.num_buckets = bucket_count(self.num_rows, self.initial_num_buckets, self.load_factor);
        let num_buckets = self.num_buckets;
        self.first.clear();
        self.first.resize(num_buckets, 0);
        self.next.clear();
        self.next.resize(self.num_rows + 1, 0);

        let rows: Vec<usize> = (0..self.num_rows).collect();
        let mut hashes = Vec::new();
        let mut has_null = Vec::new();
        hash_key_columns(&self.columns, &self.eq_cols, &rows, &mut hashes, &mut has_null)?;
        let mut buckets = Vec::new();
        self.compute_buckets(&hashes, &mut buckets);
        for (row, &bucket) in buckets.iter().enumerate() {
            let id = row + 1;
            self.next[id] = self.first[bucket];
            self.first[bucket] = id;
        }
        Ok(())
    }

    /// Bucket of each hash.
    pub fn compute_buckets(&self, hashes: &[u64], buckets: &mut Vec<usize>) {
        let mask = (self.num_buckets - 1) as u64;
        buckets.clear();
        buckets.extend(hashes.iter().map(|&hash| (hash & mask) as usize));
    }

    /// Allocate the same-key chain and visited flags for the probe phase.
    pub fn prepare_for_probing(&mut self, needs_same: bool, needs_visited: bool) {
        self.same.clear();
        if needs_same {
            self.same.resize(self.num_rows + 1, 0);
        }
        self.visited.clear();
        if needs_visited {
            self.visited.resize(self.num_rows + 1, false);
            self.visited[0] = true;
        }
    }

    /// Resolve every row of a probe batch to its first matching build row,
    /// leaving the result in `scratch.head_id` (0 for no match).
    ///
    /// # Errors
    ///
    /// Interrupts from `cx`, checked before every chain-walk round, and
    /// [`VecJoinError::Internal`] for a batch not matching `probe_eq_cols`.
    pub fn probe_batch(
        &mut self,
        cx: &Cx,
        batch: &Batch,
        probe_eq_cols: &[usize],
        behavior: &JoinBehavior,
        scratch: &mut ProbeScratch,
    ) -> Result<usize> {
        scratch.prepare_for_batch(batch);
        hash_key_columns(
            batch.columns(),
            probe_eq_cols,
            &scratch.probe_rows,
            &mut scratch.hashes,
            &mut scratch.has_null,
        )?;
        self.compute_buckets(&scratch.hashes, &mut scratch.buckets);

        for i in 0..scratch.probe_rows.len() {
            let candidate = self.first[scratch.buckets[i]];
            if scratch.has_null[i] && !self.null_equality {
                continue;
            }
            scratch.group_id[i] = candidate;
            if behavior.anti_seeding && candidate == 0 {
                continue;
            }
            scratch.to_check.push(i);
        }

        let mut rounds = 0;
        while !scratch.to_check.is_empty() {
            cx.checkpoint()?;
            rounds += 1;
            tracing::trace!(round = rounds, pending = scratch.to_check.len(), "chain walk round");
            if behavior.right_distinct {
                self.distinct_check(batch, probe_eq_cols, scratch)?;
            } else {
                self.check(batch, probe_eq_cols, scratch)?;
            }
            self.find_next(scratch);
        }
        if behavior.right_distinct {
            scratch.head_id.copy_from_slice(&scratch.group_id);
        }
        Ok(rounds)
    }

    /// Compare every pending probe row with its candidate, setting
    /// `scratch.differs`.
    fn check_keys(
        &self,
        batch: &Batch,
        probe_eq_cols: &[usize],
        scratch: &mut ProbeScratch,
    ) -> Result<()> {
        for &i in &scratch.to_check {
            scratch.differs[i] = false;
        }
        let rows = CheckRows {
            to_check: &scratch.to_check,
            probe_rows: &scratch.probe_rows,
            key_ids: &scratch.group_id,
            null_equality: self.null_equality,
        };
        for (&probe_col, &build_col) in probe_eq_cols.iter().zip(&self.eq_cols) {
            let probe = batch.column(probe_col).ok_or_else(|| {
                VecJoinError::internal(format!("probe equality column {probe_col} missing"))
            })?;
            mark_column_differs(probe, &self.columns[build_col], &rows, &mut scratch.differs)?;
        }
        Ok(())
    }

    /// Distinct-key round: an equal candidate resolves the probe row.
    pub fn distinct_check(
        &self,
        batch: &Batch,
        probe_eq_cols: &[usize],
        scratch: &mut ProbeScratch,
    ) -> Result<()> {
        self.check_keys(batch, probe_eq_cols, scratch)
    }

    /// Duplicate-key round. In default mode an equal, unvisited candidate is
    /// linked into the same-key chain of the probe row's head and the walk
    /// continues; a visited candidate means the chain is already complete. In
    /// deleting mode the first unvisited equal candidate is claimed.
    pub fn check(
        &mut self,
        batch: &Batch,
        probe_eq_cols: &[usize],
        scratch: &mut ProbeScratch,
    ) -> Result<()> {
        self.check_keys(batch, probe_eq_cols, scratch)?;
        match self.probe_mode {
            ProbeMode::Default => {
                let has_same = !self.same.is_empty();
                for &i in &scratch.to_check {
                    if scratch.differs[i] {
                        continue;
                    }
                    let key = scratch.group_id[i];
                    if scratch.head_id[i] == 0 {
                        scratch.head_id[i] = key;
                    }
                    // Without a same-key chain only existence matters.
                    if !has_same || self.visited[key] {
                        continue;
                    }
                    self.visited[key] = true;
                    let head = scratch.head_id[i];
                    if head != key {
                        self.same[key] = self.same[head];
                        self.same[head] = key;
                    }
                    scratch.differs[i] = true;
                }
            }
            ProbeMode::Deleting => {
                for &i in &scratch.to_check {
                    if scratch.differs[i] {
                        continue;
                    }
                    let key = scratch.group_id[i];
                    if self.visited[key] {
                        scratch.differs[i] = true;
                    } else {
                        self.visited[key] = true;
                        scratch.head_id[i] = key;
                    }
                }
            }
        }
        Ok(())
    }

    /// Advance rows marked `differs` along their chain and drop resolved
    /// rows from `to_check`.
    pub fn find_next(&self, scratch: &mut ProbeScratch) {
        let mut kept = 0;
        for k in 0..scratch.to_check.len() {
            let i = scratch.to_check[k];
            if !scratch.differs[i] {
                continue;
            }
            let next = self.next[scratch.group_id[i]];
            scratch.group_id[i] = next;
            if next != 0 {
                scratch.to_check[kept] = i;
                kept += 1;
            }
        }
        scratch.to_check.truncate(kept);
    }

    /// Copy of stored rows `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns [`VecJoinError::BatchFormat`] for an out-of-range window.
    pub fn window(&self, start: usize, end: usize) -> Result<Batch> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.window(start, end))
            .collect::<Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Ok(Batch::zero());
        }
        Batch::from_columns(columns, end - start)
    }

    /// Drop all rows and chains and release the build account.
    pub fn reset(&mut self, allocator: &mut Allocator) {
        for column in &mut self.columns {
            column.clear();
        }
        self.num_rows = 0;
        self.num_buckets = self.initial_num_buckets;
        self.first.clear();
        self.first.resize(self.initial_num_buckets, 0);
        self.next.clear();
        self.next.push(0);
        self.same.clear();
        self.visited.clear();
        allocator.release(self.charged_bytes);
        self.charged_bytes = 0;
    }
}

/// Fail unless `batch` has exactly the columns described by `specs`.
pub(crate) fn check_schema(side: &str, specs: &[ColumnSpec], batch: &Batch) -> Result<()> {
    if batch.columns().len() != specs.len() {
        return Err(VecJoinError::internal(format!(
            "{side} batch has {} columns, expected {}",
            batch.columns().len(),
            specs.len()
        )));
    }
    for (idx, (column, spec)) in batch.columns().iter().zip(specs).enumerate() {
        if column.data.vector_type() != spec.vector_type {
            return Err(VecJoinError::internal(format!(
                "{side} batch column {idx} has type {}, expected {}",
                column.data.vector_type(),
                spec.vector_type
            )));
        }
    }
    Ok(())
}
