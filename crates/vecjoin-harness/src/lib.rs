//! Reference joins and fixtures for checking the vectorized hash join.
//!
//! [`nested_loop_join`] evaluates every join variant row at a time over
//! plain value rows. Conformance tests compare its output multiset with the
//! output of [`HashJoiner`] under varied batching.

use std::cmp::Ordering;

use hashbrown::HashSet;
use vecjoin_error::Result;
use vecjoin_exec::{BatchSource, HashJoinConfig, HashJoiner, HashJoinerSpec, JoinType, Operator};
use vecjoin_types::{ColumnSpec, ColumnVectorType, Cx, Value};

/// Install a fmt subscriber writing to the test harness. Later calls are
/// no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Fixture schema: an Int64 key, a Text key and an Int64 payload.
#[must_use]
pub fn fixture_specs(prefix: &str) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(format!("{prefix}_k1"), ColumnVectorType::Int64),
        ColumnSpec::new(format!("{prefix}_k2"), ColumnVectorType::Text),
        ColumnSpec::new(format!("{prefix}_payload"), ColumnVectorType::Int64),
    ]
}

/// In-memory source over `rows`, cut into batches of `chunk_size`.
///
/// # Errors
///
/// Fails when `rows` do not fit `specs`.
pub fn source_from_rows(
    specs: Vec<ColumnSpec>,
    rows: &[Vec<Value>],
    chunk_size: usize,
) -> Result<BatchSource> {
    BatchSource::from_rows(specs, rows, chunk_size)
}

/// Everything an operator produced until end of stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drained {
    pub rows: Vec<Vec<Value>>,
    pub batch_sizes: Vec<usize>,
}

/// Pull `op` until it returns a zero-length batch.
///
/// # Errors
///
/// Propagates the first operator failure.
pub fn drain<O: Operator + ?Sized>(op: &mut O, cx: &Cx) -> Result<Drained> {
    op.init()?;
    let mut drained = Drained::default();
    loop {
        let batch = op.next_batch(cx)?;
        if batch.is_empty() {
            return Ok(drained);
        }
        drained.batch_sizes.push(batch.len());
        drained.rows.extend(batch.materialize_rows()?);
    }
}

/// Lexicographic order over rows using [`Value::total_cmp`].
#[must_use]
pub fn row_cmp(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Sort rows so multisets can be compared with `==`.
#[must_use]
pub fn canonicalize(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort_by(|a, b| row_cmp(a, b));
    rows
}

fn values_equal(a: &Value, b: &Value, null_equality: bool) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => null_equality,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

/// Equality-column description shared by the reference join.
#[derive(Debug, Clone, Copy)]
pub struct JoinKeys<'a> {
    pub left_eq: &'a [usize],
    pub right_eq: &'a [usize],
    pub left_width: usize,
    pub right_width: usize,
}

impl JoinKeys<'_> {
    fn matches(&self, l: &[Value], r: &[Value], null_equality: bool) -> bool {
        self.left_eq
            .iter()
            .zip(self.right_eq)
            .all(|(&li, &ri)| values_equal(&l[li], &r[ri], null_equality))
    }
}

fn padded(left: Option<&[Value]>, right: Option<&[Value]>, keys: &JoinKeys<'_>) -> Vec<Value> {
    let mut row = Vec::with_capacity(keys.left_width + keys.right_width);
    match left {
        Some(l) => row.extend_from_slice(l),
        None => row.resize(keys.left_width, Value::Null),
    }
    match right {
        Some(r) => row.extend_from_slice(r),
        None => row.resize(keys.left_width + keys.right_width, Value::Null),
    }
    row
}

/// Row-at-a-time join of `left` (probe) with `right` (build).
///
/// Set operations treat NULL keys as equal and let each right row cancel at
/// most one left row, in left order.
#[must_use]
pub fn nested_loop_join(
    join_type: JoinType,
    left: &[Vec<Value>],
    right: &[Vec<Value>],
    keys: &JoinKeys<'_>,
) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    if join_type.is_set_operation() {
        let mut claimed: HashSet<usize> = HashSet::new();
        for l in left {
            let claim = right
                .iter()
                .enumerate()
                .find(|(idx, r)| !claimed.contains(idx) && keys.matches(l, r, true))
                .map(|(idx, _)| idx);
            if let Some(idx) = claim {
                claimed.insert(idx);
            }
            let emit = match join_type {
                JoinType::IntersectAll => claim.is_some(),
                _ => claim.is_none(),
            };
            if emit {
                out.push(l.clone());
            }
        }
        return out;
    }

    let mut right_matched: HashSet<usize> = HashSet::new();
    for l in left {
        let mut matched = false;
        for (idx, r) in right.iter().enumerate() {
            if !keys.matches(l, r, false) {
                continue;
            }
            matched = true;
            right_matched.insert(idx);
            if join_type.emits_pairs() {
                out.push(padded(Some(l), Some(r), keys));
            }
        }
        match join_type {
            JoinType::LeftOuter | JoinType::FullOuter if !matched => {
                out.push(padded(Some(l), None, keys));
            }
            JoinType::LeftSemi if matched => out.push(l.clone()),
            JoinType::LeftAnti if !matched => out.push(l.clone()),
            _ => {}
        }
    }
    for (idx, r) in right.iter().enumerate() {
        let matched = right_matched.contains(&idx);
        match join_type {
            JoinType::RightOuter | JoinType::FullOuter if !matched => {
                out.push(padded(None, Some(r), keys));
            }
            JoinType::RightSemi if matched => out.push(r.clone()),
            JoinType::RightAnti if !matched => out.push(r.clone()),
            _ => {}
        }
    }
    out
}

/// One hash join run over fixture-shaped rows.
#[derive(Debug, Clone)]
pub struct JoinCase<'a> {
    pub join_type: JoinType,
    pub left: &'a [Vec<Value>],
    pub right: &'a [Vec<Value>],
    pub left_eq: &'a [usize],
    pub right_eq: &'a [usize],
    pub right_distinct: bool,
    pub left_chunk: usize,
    pub right_chunk: usize,
    pub config: HashJoinConfig,
}

impl<'a> JoinCase<'a> {
    #[must_use]
    pub fn new(join_type: JoinType, left: &'a [Vec<Value>], right: &'a [Vec<Value>]) -> Self {
        Self {
            join_type,
            left,
            right,
            left_eq: &[0],
            right_eq: &[0],
            right_distinct: false,
            left_chunk: 1024,
            right_chunk: 1024,
            config: HashJoinConfig::default(),
        }
    }

    /// Build the joiner over [`fixture_specs`] sources.
    ///
    /// # Errors
    ///
    /// Fails for an invalid spec or config.
    pub fn joiner(&self) -> Result<HashJoiner<BatchSource, BatchSource>> {
        let spec = HashJoinerSpec::new(
            self.join_type,
            self.left_eq,
            self.right_eq,
            fixture_specs("l"),
            fixture_specs("r"),
            self.right_distinct,
        )?;
        let left = source_from_rows(fixture_specs("l"), self.left, self.left_chunk)?;
        let right = source_from_rows(fixture_specs("r"), self.right, self.right_chunk)?;
        HashJoiner::with_config(spec, self.config.clone(), left, right)
    }

    /// Run the hash join to completion.
    ///
    /// # Errors
    ///
    /// Propagates construction and execution failures.
    pub fn run(&self) -> Result<Drained> {
        let mut joiner = self.joiner()?;
        drain(&mut joiner, &Cx::new())
    }

    /// Reference result for the same inputs.
    #[must_use]
    pub fn expected(&self) -> Vec<Vec<Value>> {
        let keys = JoinKeys {
            left_eq: self.left_eq,
            right_eq: self.right_eq,
            left_width: fixture_specs("l").len(),
            right_width: fixture_specs("r").len(),
        };
        nested_loop_join(self.join_type, self.left, self.right, &keys)
    }
}

/// Fixture row.
#[must_use]
pub fn fixture_row(k1: Option<i64>, k2: Option<&str>, payload: i64) -> Vec<Value> {
    vec![Value::from(k1), Value::from(k2), Value::Integer(payload)]
}
