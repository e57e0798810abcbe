//! Pull-based operator interfaces.
//!
//! Every operator hands out one [`Batch`] per `next_batch` call. A
//! zero-length batch ends the stream, and exhausted operators keep returning
//! zero-length batches.

use vecjoin_error::{Result, VecJoinError};
use vecjoin_types::{Batch, ColumnSpec, Cx, Value};

/// Downstream/upstream pull interface.
pub trait Operator {
    /// Prepare for the first pull. Calling it twice is harmless.
    ///
    /// # Errors
    ///
    /// Propagates failures of upstream operators.
    fn init(&mut self) -> Result<()>;

    /// Produce the next batch, or a zero-length batch at end of stream.
    ///
    /// # Errors
    ///
    /// Operator specific; see [`VecJoinError`].
    fn next_batch(&mut self, cx: &Cx) -> Result<Batch>;

    /// Rewind for another execution over the same inputs.
    ///
    /// # Errors
    ///
    /// Propagates failures of upstream operators.
    fn reset(&mut self) -> Result<()>;

    /// Columns of every batch this operator produces.
    fn schema(&self) -> &[ColumnSpec];
}

impl<O: Operator + ?Sized> Operator for Box<O> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn next_batch(&mut self, cx: &Cx) -> Result<Batch> {
        (**self).next_batch(cx)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn schema(&self) -> &[ColumnSpec] {
        (**self).schema()
    }
}

/// Input of a two-input operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSide {
    Left,
    Right,
}

/// Operator that buffers input rows in memory and can hand them to a spill
/// controller after running out of budget.
pub trait BufferingInMemoryOperator: Operator {
    /// Next window of rows buffered from `side`. A zero-length batch means
    /// everything has been exported.
    ///
    /// # Errors
    ///
    /// Fails when the buffered rows cannot be copied.
    fn export_buffered(&mut self, side: InputSide) -> Result<Batch>;
}

/// In-memory source over pre-built batches.
#[derive(Debug, Clone)]
pub struct BatchSource {
    specs: Vec<ColumnSpec>,
    batches: Vec<Batch>,
    cursor: usize,
    pulls: usize,
}

impl BatchSource {
    /// Source yielding `batches` in order. Zero-length batches are dropped
    /// since they would end the stream early.
    #[must_use]
    pub fn new(specs: Vec<ColumnSpec>, batches: Vec<Batch>) -> Self {
        let batches = batches.into_iter().filter(|batch| !batch.is_empty()).collect();
        Self {
            specs,
            batches,
            cursor: 0,
            pulls: 0,
        }
    }

    /// Source over `rows`, chunked into batches of `chunk_size` rows.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero chunk size or rows that do not fit `specs`.
    pub fn from_rows(specs: Vec<ColumnSpec>, rows: &[Vec<Value>], chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(VecJoinError::batch_format("chunk size must be positive"));
        }
        let batches = rows
            .chunks(chunk_size)
            .map(|chunk| Batch::from_rows(chunk, &specs, chunk_size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(specs, batches))
    }

    /// Number of `next_batch` calls since construction or the last reset.
    #[must_use]
    pub const fn pull_count(&self) -> usize {
        self.pulls
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

impl Operator for BatchSource {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_batch(&mut self, cx: &Cx) -> Result<Batch> {
        cx.checkpoint()?;
        self.pulls += 1;
        match self.batches.get(self.cursor) {
            Some(batch) => {
                self.cursor += 1;
                Ok(batch.clone())
            }
            None => Ok(Batch::empty(&self.specs)),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        self.pulls = 0;
        Ok(())
    }

    fn schema(&self) -> &[ColumnSpec] {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecjoin_types::ColumnVectorType;

    fn rows(n: i64) -> Vec<Vec<Value>> {
        (0..n).map(|i| vec![Value::Integer(i)]).collect()
    }

    #[test]
    fn source_chunks_and_stays_exhausted() {
        let specs = vec![ColumnSpec::new("k", ColumnVectorType::Int64)];
        let mut source = BatchSource::from_rows(specs, &rows(5), 2).unwrap();
        let cx = Cx::new();
        let lens: Vec<usize> = (0..5)
            .map(|_| source.next_batch(&cx).unwrap().len())
            .collect();
        assert_eq!(lens, vec![2, 2, 1, 0, 0]);
        assert_eq!(source.pull_count(), 5);
        source.reset().unwrap();
        assert_eq!(source.next_batch(&cx).unwrap().len(), 2);
    }

    #[test]
    fn exhausted_batch_keeps_schema() {
        let specs = vec![ColumnSpec::new("k", ColumnVectorType::Int64)];
        let mut source = BatchSource::new(specs.clone(), Vec::new());
        let batch = source.next_batch(&Cx::new()).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.specs(), specs);
    }

    #[test]
    fn cancelled_context_stops_pull() {
        let specs = vec![ColumnSpec::new("k", ColumnVectorType::Int64)];
        let mut source = BatchSource::from_rows(specs, &rows(3), 3).unwrap();
        let cx = Cx::new();
        cx.cancel();
        assert_eq!(source.next_batch(&cx), Err(VecJoinError::Cancelled));
        assert_eq!(source.pull_count(), 0);
    }
}
