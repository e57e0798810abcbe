//! Hash joiner specification.

use smallvec::SmallVec;
use vecjoin_error::{Result, VecJoinError};
use vecjoin_types::ColumnSpec;

use crate::join_type::{JoinBehavior, JoinType};

/// Equality column indices of one input. Keys rarely span more than four
/// columns.
pub type EqColumns = SmallVec<[usize; 4]>;

/// One input of the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashJoinerSourceSpec {
    pub eq_cols: EqColumns,
    pub columns: Vec<ColumnSpec>,
}

impl HashJoinerSourceSpec {
    #[must_use]
    pub fn new(eq_cols: &[usize], columns: Vec<ColumnSpec>) -> Self {
        Self {
            eq_cols: SmallVec::from_slice(eq_cols),
            columns,
        }
    }

    fn validate(&self, side: &str) -> Result<()> {
        if self.eq_cols.is_empty() {
            return Err(VecJoinError::invalid_spec(format!(
                "{side} side has no equality columns"
            )));
        }
        if let Some(&bad) = self.eq_cols.iter().find(|&&col| col >= self.columns.len()) {
            return Err(VecJoinError::invalid_spec(format!(
                "{side} equality column {bad} out of range for {} columns",
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// Immutable description of a hash join, normalized at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashJoinerSpec {
    join_type: JoinType,
    left: HashJoinerSourceSpec,
    right: HashJoinerSourceSpec,
    right_distinct: bool,
    track_build_matches: bool,
}

impl HashJoinerSpec {
    /// Validate and normalize a join description.
    ///
    /// `right_distinct` is a hint that the right equality columns form a
    /// unique key. Left semi joins always probe in distinct mode; anti, right
    /// semi and set-operation joins never do.
    ///
    /// # Errors
    ///
    /// [`VecJoinError::InvalidSpec`] for mismatched or out-of-range equality
    /// columns.
    pub fn new(
        join_type: JoinType,
        left_eq_cols: &[usize],
        right_eq_cols: &[usize],
        left_columns: Vec<ColumnSpec>,
        right_columns: Vec<ColumnSpec>,
        right_distinct: bool,
    ) -> Result<Self> {
        let left = HashJoinerSourceSpec::new(left_eq_cols, left_columns);
        let right = HashJoinerSourceSpec::new(right_eq_cols, right_columns);
        left.validate("left")?;
        right.validate("right")?;
        if left.eq_cols.len() != right.eq_cols.len() {
            return Err(VecJoinError::invalid_spec(format!(
                "left has {} equality columns, right has {}",
                left.eq_cols.len(),
                right.eq_cols.len()
            )));
        }
        for (&l, &r) in left.eq_cols.iter().zip(&right.eq_cols) {
            let (lt, rt) = (left.columns[l].vector_type, right.columns[r].vector_type);
            if lt != rt {
                return Err(VecJoinError::invalid_spec(format!(
                    "equality columns {l} ({lt}) and {r} ({rt}) have different types"
                )));
            }
        }

        let right_distinct = match join_type {
            JoinType::LeftSemi => true,
            JoinType::LeftAnti
            | JoinType::RightAnti
            | JoinType::RightSemi
            | JoinType::IntersectAll
            | JoinType::ExceptAll => false,
            JoinType::Inner | JoinType::LeftOuter | JoinType::RightOuter | JoinType::FullOuter => {
                right_distinct
            }
        };

        Ok(Self {
            join_type,
            left,
            right,
            right_distinct,
            track_build_matches: join_type.tracks_build_matches(),
        })
    }

    #[must_use]
    pub const fn join_type(&self) -> JoinType {
        self.join_type
    }

    #[must_use]
    pub const fn left(&self) -> &HashJoinerSourceSpec {
        &self.left
    }

    #[must_use]
    pub const fn right(&self) -> &HashJoinerSourceSpec {
        &self.right
    }

    #[must_use]
    pub const fn right_distinct(&self) -> bool {
        self.right_distinct
    }

    #[must_use]
    pub const fn track_build_matches(&self) -> bool {
        self.track_build_matches
    }

    #[must_use]
    pub const fn behavior(&self) -> JoinBehavior {
        JoinBehavior::new(self.join_type, self.right_distinct)
    }

    /// Output columns: left columns if included, then right columns if
    /// included.
    #[must_use]
    pub fn output_specs(&self) -> Vec<ColumnSpec> {
        let mut specs = Vec::new();
        if self.join_type.include_left_columns() {
            specs.extend(self.left.columns.iter().cloned());
        }
        if self.join_type.include_right_columns() {
            specs.extend(self.right.columns.iter().cloned());
        }
        specs
    }
}
