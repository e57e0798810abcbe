//! Vectorized equi-join execution.
//!
//! [`HashJoiner`] joins two pull-based [`Operator`] inputs batch at a time.
//! The right input is materialized into a bucket-chain [`HashTable`]; the
//! left input is streamed against it. All inner, outer, semi, anti and
//! set-operation variants of [`JoinType`] share the same probe loop and
//! differ only in the [`JoinBehavior`] derived from their specification.

pub mod collect;
pub mod config;
pub mod hash_join;
pub mod hash_table;
pub mod join_type;
pub mod memory;
pub mod metrics;
pub mod operator;
pub mod probe_scratch;
pub mod spec;

pub use config::HashJoinConfig;
pub use hash_join::{HashJoiner, HashJoinerState};
pub use hash_table::HashTable;
pub use join_type::{CollectMode, JoinBehavior, JoinType, ProbeMode};
pub use memory::{Allocator, MemoryAccount};
pub use metrics::{HashJoinMetricsSnapshot, hash_join_metrics_snapshot, reset_hash_join_metrics};
pub use operator::{BatchSource, BufferingInMemoryOperator, InputSide, Operator};
pub use probe_scratch::{ProbeScratch, ProbeState};
pub use spec::{HashJoinerSourceSpec, HashJoinerSpec};
