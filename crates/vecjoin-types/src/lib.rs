//! Core types for the vecjoin workspace: columnar batches, row values and
//! the cancellation context threaded through every pull.

pub mod batch;
pub mod cx;
pub mod value;

pub use batch::{
    Batch, Column, ColumnData, ColumnSpec, ColumnVectorType, DEFAULT_BATCH_ROW_CAPACITY,
    MAX_BATCH_ROW_CAPACITY, NullBitmap, SelectionVector,
};
pub use cx::Cx;
pub use value::Value;
