//! Join variants and the behaviors derived from them.
//!
//! The hot loops never match on [`JoinType`]; they read a [`JoinBehavior`]
//! computed once when the joiner is built.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported join variants. The left input is probed, the right input is
/// built into the hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    /// Left rows with at least one match, each once.
    LeftSemi,
    /// Left rows without a match.
    LeftAnti,
    /// Right rows with at least one match, each once.
    RightSemi,
    /// Right rows without a match.
    RightAnti,
    /// Multiset intersection of the left and right keys.
    IntersectAll,
    /// Multiset difference of the left and right keys.
    ExceptAll,
}

impl JoinType {
    pub const ALL: [Self; 10] = [
        Self::Inner,
        Self::LeftOuter,
        Self::RightOuter,
        Self::FullOuter,
        Self::LeftSemi,
        Self::LeftAnti,
        Self::RightSemi,
        Self::RightAnti,
        Self::IntersectAll,
        Self::ExceptAll,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::LeftOuter => "left_outer",
            Self::RightOuter => "right_outer",
            Self::FullOuter => "full_outer",
            Self::LeftSemi => "left_semi",
            Self::LeftAnti => "left_anti",
            Self::RightSemi => "right_semi",
            Self::RightAnti => "right_anti",
            Self::IntersectAll => "intersect_all",
            Self::ExceptAll => "except_all",
        }
    }

    /// Whether left columns appear in the output.
    #[must_use]
    pub const fn include_left_columns(self) -> bool {
        !self.is_right_semi_or_right_anti()
    }

    /// Whether right columns appear in the output.
    #[must_use]
    pub const fn include_right_columns(self) -> bool {
        !matches!(
            self,
            Self::LeftSemi | Self::LeftAnti | Self::IntersectAll | Self::ExceptAll
        )
    }

    /// Whether the output pairs each probe row with its matching build rows.
    #[must_use]
    pub const fn emits_pairs(self) -> bool {
        self.include_left_columns() && self.include_right_columns()
    }

    /// Whether an empty right input forces an empty result.
    #[must_use]
    pub const fn is_empty_output_when_right_is_empty(self) -> bool {
        matches!(
            self,
            Self::Inner
                | Self::RightOuter
                | Self::LeftSemi
                | Self::RightSemi
                | Self::RightAnti
                | Self::IntersectAll
        )
    }

    #[must_use]
    pub const fn is_left_outer_or_full_outer(self) -> bool {
        matches!(self, Self::LeftOuter | Self::FullOuter)
    }

    #[must_use]
    pub const fn is_left_anti_or_except_all(self) -> bool {
        matches!(self, Self::LeftAnti | Self::ExceptAll)
    }

    #[must_use]
    pub const fn is_right_semi_or_right_anti(self) -> bool {
        matches!(self, Self::RightSemi | Self::RightAnti)
    }

    #[must_use]
    pub const fn is_set_operation(self) -> bool {
        matches!(self, Self::IntersectAll | Self::ExceptAll)
    }

    /// Whether the joiner must remember which build rows were matched.
    #[must_use]
    pub const fn tracks_build_matches(self) -> bool {
        matches!(
            self,
            Self::RightOuter | Self::FullOuter | Self::RightSemi | Self::RightAnti
        )
    }

    /// Whether probe rows falling into empty buckets skip the equality loop.
    #[must_use]
    pub const fn uses_anti_seeding(self) -> bool {
        matches!(self, Self::LeftAnti | Self::RightAnti | Self::ExceptAll)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How equal build rows are consumed while probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeMode {
    /// Every probe row sees every equal build row.
    Default,
    /// Each build row is claimed by at most one probe row.
    Deleting,
}

/// What the probe phase emits for each probe row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectMode {
    /// One output row per (probe, build) match. With `probe_outer`, a probe
    /// row without a match still yields one row with NULL right columns.
    Pairs { probe_outer: bool },
    /// The probe row once if it matched.
    ProbeIfMatched,
    /// The probe row once if it did not match.
    ProbeIfUnmatched,
    /// Nothing; matched build rows are recorded for the emit-right phase.
    MarkBuildMatches,
}

/// Join-type dependent switches, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinBehavior {
    pub join_type: JoinType,
    pub include_left: bool,
    pub include_right: bool,
    pub track_build_matches: bool,
    pub right_distinct: bool,
    pub anti_seeding: bool,
    /// Whether NULL keys compare equal.
    pub null_equality: bool,
    pub probe_mode: ProbeMode,
    pub collect: CollectMode,
    /// Polarity of the emit-right phase: matched rows for right semi,
    /// unmatched rows otherwise.
    pub emit_right_matched: bool,
    pub needs_same_key_chain: bool,
    pub needs_visited: bool,
}

impl JoinBehavior {
    /// Behavior for `join_type` given an already normalized `right_distinct`.
    #[must_use]
    pub const fn new(join_type: JoinType, right_distinct: bool) -> Self {
        let set_op = join_type.is_set_operation();
        let collect = match join_type {
            JoinType::Inner | JoinType::RightOuter => CollectMode::Pairs { probe_outer: false },
            JoinType::LeftOuter | JoinType::FullOuter => CollectMode::Pairs { probe_outer: true },
            JoinType::LeftSemi | JoinType::IntersectAll => CollectMode::ProbeIfMatched,
            JoinType::LeftAnti | JoinType::ExceptAll => CollectMode::ProbeIfUnmatched,
            JoinType::RightSemi | JoinType::RightAnti => CollectMode::MarkBuildMatches,
        };
        Self {
            join_type,
            include_left: join_type.include_left_columns(),
            include_right: join_type.include_right_columns(),
            track_build_matches: join_type.tracks_build_matches(),
            right_distinct,
            anti_seeding: join_type.uses_anti_seeding(),
            null_equality: set_op,
            probe_mode: if set_op {
                ProbeMode::Deleting
            } else {
                ProbeMode::Default
            },
            collect,
            emit_right_matched: matches!(join_type, JoinType::RightSemi),
            needs_same_key_chain: !right_distinct && !join_type.is_left_anti_or_except_all(),
            needs_visited: !right_distinct || set_op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_inclusion() {
        assert!(JoinType::Inner.include_left_columns());
        assert!(JoinType::Inner.include_right_columns());
        assert!(JoinType::LeftSemi.include_left_columns());
        assert!(!JoinType::LeftSemi.include_right_columns());
        assert!(!JoinType::RightSemi.include_left_columns());
        assert!(JoinType::RightSemi.include_right_columns());
        assert!(JoinType::RightAnti.include_right_columns());
        assert!(!JoinType::LeftAnti.include_right_columns());
        assert!(!JoinType::ExceptAll.include_right_columns());
        assert!(!JoinType::IntersectAll.include_right_columns());
    }

    #[test]
    fn pairs_only_for_inner_and_outer_joins() {
        let pairs: Vec<JoinType> = JoinType::ALL
            .into_iter()
            .filter(|jt| jt.emits_pairs())
            .collect();
        assert_eq!(
            pairs,
            vec![
                JoinType::Inner,
                JoinType::LeftOuter,
                JoinType::RightOuter,
                JoinType::FullOuter,
            ]
        );
    }

    #[test]
    fn build_match_tracking() {
        let tracked: Vec<JoinType> = JoinType::ALL
            .into_iter()
            .filter(|jt| jt.tracks_build_matches())
            .collect();
        assert_eq!(
            tracked,
            vec![
                JoinType::RightOuter,
                JoinType::FullOuter,
                JoinType::RightSemi,
                JoinType::RightAnti,
            ]
        );
    }

    #[test]
    fn set_operations_use_deleting_probe() {
        let b = JoinBehavior::new(JoinType::IntersectAll, false);
        assert_eq!(b.probe_mode, ProbeMode::Deleting);
        assert!(b.null_equality);
        assert!(b.needs_visited);
        assert!(b.needs_same_key_chain);

        let b = JoinBehavior::new(JoinType::ExceptAll, false);
        assert!(!b.needs_same_key_chain);
        assert!(b.needs_visited);
        assert!(b.anti_seeding);
        assert_eq!(b.collect, CollectMode::ProbeIfUnmatched);
    }

    #[test]
    fn distinct_inner_needs_no_linking() {
        let b = JoinBehavior::new(JoinType::Inner, true);
        assert!(!b.needs_same_key_chain);
        assert!(!b.needs_visited);
        assert_eq!(b.collect, CollectMode::Pairs { probe_outer: false });
        assert!(!b.null_equality);
    }

    #[test]
    fn right_semi_emits_matched() {
        assert!(JoinBehavior::new(JoinType::RightSemi, false).emit_right_matched);
        assert!(!JoinBehavior::new(JoinType::RightAnti, false).emit_right_matched);
        assert!(!JoinBehavior::new(JoinType::FullOuter, false).emit_right_matched);
    }
}
