//! Columnar batch container.
//!
//! A [`Batch`] holds up to [`MAX_BATCH_ROW_CAPACITY`] rows laid out column by
//! column, an optional [`SelectionVector`] choosing which physical rows are
//! logically present, and per-column validity bitmaps.

use std::fmt;

use serde::{Deserialize, Serialize};
use vecjoin_error::{Result, VecJoinError};

use crate::value::Value;

/// Default number of rows per batch.
pub const DEFAULT_BATCH_ROW_CAPACITY: usize = 1024;

/// Largest batch addressable by a `u16` selection vector.
pub const MAX_BATCH_ROW_CAPACITY: usize = u16::MAX as usize + 1;

// ── Schema ─────────────────────────────────────────────────────────────────

/// Physical vector type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnVectorType {
    Bool,
    Int32,
    Int64,
    Float64,
    Text,
    Binary,
}

impl ColumnVectorType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for ColumnVectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named, typed column slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub vector_type: ColumnVectorType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, vector_type: ColumnVectorType) -> Self {
        Self {
            name: name.into(),
            vector_type,
        }
    }
}

// ── Validity ───────────────────────────────────────────────────────────────

/// Validity bitmap: bit set means the row holds a value, clear means NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullBitmap {
    bytes: Vec<u8>,
    len: usize,
}

impl NullBitmap {
    #[must_use]
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(rows.div_ceil(8)),
            len: 0,
        }
    }

    /// Bitmap of `len` valid rows.
    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        let mut bytes = vec![0xff_u8; len.div_ceil(8)];
        if len % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last = (1_u8 << (len % 8)) - 1;
            }
        }
        Self { bytes, len }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn push(&mut self, valid: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if valid {
            self.bytes[self.len / 8] |= 1_u8 << (self.len % 8);
        }
        self.len += 1;
    }

    pub fn extend_nulls(&mut self, n: usize) {
        for _ in 0..n {
            self.push(false);
        }
    }

    /// Out-of-range rows read as NULL.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, idx: usize) -> bool {
        idx < self.len && self.bytes[idx / 8] & (1_u8 << (idx % 8)) != 0
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        !self.is_valid(idx)
    }

    #[inline]
    pub fn set_null(&mut self, idx: usize) {
        if idx < self.len {
            self.bytes[idx / 8] &= !(1_u8 << (idx % 8));
        }
    }

    /// Mark `[start, end)` as NULL.
    pub fn set_null_range(&mut self, start: usize, end: usize) {
        for idx in start..end.min(self.len) {
            self.set_null(idx);
        }
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        (0..self.len).filter(|&idx| self.is_null(idx)).count()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.len = 0;
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}

// ── Selection ──────────────────────────────────────────────────────────────

/// Physical row indices that are logically present in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionVector {
    indices: Vec<u16>,
}

impl SelectionVector {
    #[must_use]
    pub const fn from_indices(indices: Vec<u16>) -> Self {
        Self { indices }
    }

    /// Selection of rows `0..len`.
    ///
    /// # Errors
    ///
    /// Returns an error when `len` exceeds [`MAX_BATCH_ROW_CAPACITY`].
    pub fn identity(len: usize) -> Result<Self> {
        if len > MAX_BATCH_ROW_CAPACITY {
            return Err(VecJoinError::batch_format(format!(
                "selection of {len} rows exceeds maximum batch capacity {MAX_BATCH_ROW_CAPACITY}"
            )));
        }
        let indices = (0..len)
            .map(|idx| u16::try_from(idx).unwrap_or(u16::MAX))
            .collect();
        Ok(Self { indices })
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// ── Column data ────────────────────────────────────────────────────────────

/// Typed column storage. NULL rows hold a default placeholder value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    /// UTF-8 strings; `offsets` has `len + 1` entries.
    Text { offsets: Vec<u32>, data: Vec<u8> },
    /// Byte strings; `offsets` has `len + 1` entries.
    Binary { offsets: Vec<u32>, data: Vec<u8> },
}

impl ColumnData {
    #[must_use]
    pub fn with_capacity(vector_type: ColumnVectorType, rows: usize) -> Self {
        let mut offsets = Vec::with_capacity(rows + 1);
        match vector_type {
            ColumnVectorType::Bool => Self::Bool(Vec::with_capacity(rows)),
            ColumnVectorType::Int32 => Self::Int32(Vec::with_capacity(rows)),
            ColumnVectorType::Int64 => Self::Int64(Vec::with_capacity(rows)),
            ColumnVectorType::Float64 => Self::Float64(Vec::with_capacity(rows)),
            ColumnVectorType::Text => {
                offsets.push(0);
                Self::Text {
                    offsets,
                    data: Vec::new(),
                }
            }
            ColumnVectorType::Binary => {
                offsets.push(0);
                Self::Binary {
                    offsets,
                    data: Vec::new(),
                }
            }
        }
    }

    #[must_use]
    pub const fn vector_type(&self) -> ColumnVectorType {
        match self {
            Self::Bool(_) => ColumnVectorType::Bool,
            Self::Int32(_) => ColumnVectorType::Int32,
            Self::Int64(_) => ColumnVectorType::Int64,
            Self::Float64(_) => ColumnVectorType::Float64,
            Self::Text { .. } => ColumnVectorType::Text,
            Self::Binary { .. } => ColumnVectorType::Binary,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Text { offsets, .. } | Self::Binary { offsets, .. } => {
                offsets.len().saturating_sub(1)
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that varlen offsets start at 0, never decrease and stay within
    /// the byte buffer. Fixed-width data always passes.
    ///
    /// # Errors
    ///
    /// Returns [`VecJoinError::BatchFormat`] for malformed offsets.
    pub fn check_offsets(&self) -> Result<()> {
        let (Self::Text { offsets, data } | Self::Binary { offsets, data }) = self else {
            return Ok(());
        };
        if offsets.first().copied().unwrap_or(0) != 0 {
            return Err(VecJoinError::batch_format("varlen offsets must start at 0"));
        }
        if let Some(pos) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(VecJoinError::batch_format(format!(
                "varlen offsets decrease at row {pos}"
            )));
        }
        match offsets.last() {
            Some(&end) if end as usize > data.len() => Err(VecJoinError::batch_format(format!(
                "varlen offset {end} is past the {} byte buffer",
                data.len()
            ))),
            _ => Ok(()),
        }
    }

    fn push_default(&mut self) -> Result<()> {
        match self {
            Self::Bool(v) => v.push(false),
            Self::Int32(v) => v.push(0),
            Self::Int64(v) => v.push(0),
            Self::Float64(v) => v.push(0.0),
            Self::Text { offsets, data } | Self::Binary { offsets, data } => {
                offsets.push(offset_of(data.len())?);
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        match self {
            Self::Bool(v) => v.clear(),
            Self::Int32(v) => v.clear(),
            Self::Int64(v) => v.clear(),
            Self::Float64(v) => v.clear(),
            Self::Text { offsets, data } | Self::Binary { offsets, data } => {
                offsets.clear();
                offsets.push(0);
                data.clear();
            }
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int32(v) => v.len() * size_of::<i32>(),
            Self::Int64(v) => v.len() * size_of::<i64>(),
            Self::Float64(v) => v.len() * size_of::<f64>(),
            Self::Text { offsets, data } | Self::Binary { offsets, data } => {
                offsets.len() * size_of::<u32>() + data.len()
            }
        }
    }
}

fn offset_of(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        VecJoinError::batch_format(format!("varlen column data of {len} bytes overflows u32"))
    })
}

fn row_out_of_bounds(row: usize, len: usize) -> VecJoinError {
    VecJoinError::batch_format(format!("row index {row} out of bounds for column of {len} rows"))
}

fn type_mismatch(expected: ColumnVectorType, actual: impl fmt::Display) -> VecJoinError {
    VecJoinError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Copy `rows` of a fixed-width source. The position of a row in `rows` is
/// looked up in `mask`; masked positions become NULL without reading `src`.
fn copy_fixed<T: Copy + Default>(
    dst: &mut Vec<T>,
    validity: &mut NullBitmap,
    src: &[T],
    src_validity: &NullBitmap,
    rows: impl Iterator<Item = usize>,
    mask: Option<&[bool]>,
) -> Result<()> {
    for (pos, row) in rows.enumerate() {
        if mask.is_some_and(|mask| mask[pos]) {
            dst.push(T::default());
            validity.push(false);
            continue;
        }
        let value = *src.get(row).ok_or_else(|| row_out_of_bounds(row, src.len()))?;
        dst.push(value);
        validity.push(src_validity.is_valid(row));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn copy_varlen(
    dst_offsets: &mut Vec<u32>,
    dst_data: &mut Vec<u8>,
    validity: &mut NullBitmap,
    src_offsets: &[u32],
    src_data: &[u8],
    src_validity: &NullBitmap,
    rows: impl Iterator<Item = usize>,
    mask: Option<&[bool]>,
) -> Result<()> {
    let src_rows = src_offsets.len().saturating_sub(1);
    for (pos, row) in rows.enumerate() {
        if mask.is_some_and(|mask| mask[pos]) {
            dst_offsets.push(offset_of(dst_data.len())?);
            validity.push(false);
            continue;
        }
        if row >= src_rows {
            return Err(row_out_of_bounds(row, src_rows));
        }
        let start = src_offsets[row] as usize;
        let end = src_offsets[row + 1] as usize;
        let bytes = src_data
            .get(start..end)
            .ok_or_else(|| VecJoinError::batch_format(format!("invalid offsets for row {row}")))?;
        dst_data.extend_from_slice(bytes);
        dst_offsets.push(offset_of(dst_data.len())?);
        validity.push(src_validity.is_valid(row));
    }
    Ok(())
}

// ── Column ─────────────────────────────────────────────────────────────────

/// One column of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub spec: ColumnSpec,
    pub data: ColumnData,
    pub validity: NullBitmap,
}

impl Column {
    #[must_use]
    pub fn with_capacity(spec: ColumnSpec, rows: usize) -> Self {
        let data = ColumnData::with_capacity(spec.vector_type, rows);
        Self {
            spec,
            data,
            validity: NullBitmap::with_capacity(rows),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.is_valid(row)
    }

    /// Append one NULL row.
    ///
    /// # Errors
    ///
    /// Fails only when varlen offsets overflow.
    pub fn push_null(&mut self) -> Result<()> {
        self.data.push_default()?;
        self.validity.push(false);
        Ok(())
    }

    /// Append `n` NULL rows.
    ///
    /// # Errors
    ///
    /// Fails only when varlen offsets overflow.
    pub fn extend_nulls(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.push_null()?;
        }
        Ok(())
    }

    /// Append a row value, converting integers to the column width.
    ///
    /// # Errors
    ///
    /// Returns an error when the value does not fit the column type.
    pub fn push_value(&mut self, value: &Value) -> Result<()> {
        let vector_type = self.spec.vector_type;
        match (&mut self.data, value) {
            (_, Value::Null) => return self.push_null(),
            (ColumnData::Bool(v), Value::Bool(b)) => v.push(*b),
            (ColumnData::Int32(v), Value::Integer(i)) => {
                let narrowed = i32::try_from(*i).map_err(|_| {
                    VecJoinError::batch_format(format!("integer {i} does not fit into int32"))
                })?;
                v.push(narrowed);
            }
            (ColumnData::Int64(v), Value::Integer(i)) => v.push(*i),
            (ColumnData::Float64(v), Value::Float(f)) => v.push(*f),
            #[allow(clippy::cast_precision_loss)]
            (ColumnData::Float64(v), Value::Integer(i)) => v.push(*i as f64),
            (ColumnData::Text { offsets, data }, Value::Text(s)) => {
                data.extend_from_slice(s.as_bytes());
                offsets.push(offset_of(data.len())?);
            }
            (ColumnData::Binary { offsets, data }, Value::Blob(b)) => {
                data.extend_from_slice(b);
                offsets.push(offset_of(data.len())?);
            }
            (_, other) => return Err(type_mismatch(vector_type, format!("value {other}"))),
        }
        self.validity.push(true);
        Ok(())
    }

    /// Read a row back as a [`Value`].
    ///
    /// # Errors
    ///
    /// Returns an error when `row` is out of bounds or text is not UTF-8.
    pub fn value_at(&self, row: usize) -> Result<Value> {
        if row >= self.len() {
            return Err(row_out_of_bounds(row, self.len()));
        }
        if !self.validity.is_valid(row) {
            return Ok(Value::Null);
        }
        let value = match &self.data {
            ColumnData::Bool(v) => Value::Bool(v[row]),
            ColumnData::Int32(v) => Value::Integer(i64::from(v[row])),
            ColumnData::Int64(v) => Value::Integer(v[row]),
            ColumnData::Float64(v) => Value::Float(v[row]),
            ColumnData::Text { offsets, data } => {
                let bytes = &data[offsets[row] as usize..offsets[row + 1] as usize];
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    VecJoinError::batch_format(format!(
                        "column {} row {row} contains invalid UTF-8",
                        self.spec.name
                    ))
                })?;
                Value::Text(text.to_owned())
            }
            ColumnData::Binary { offsets, data } => {
                Value::Blob(data[offsets[row] as usize..offsets[row + 1] as usize].to_vec())
            }
        };
        Ok(value)
    }

    /// Append the given rows of `src`, which must have the same vector type.
    ///
    /// # Errors
    ///
    /// Returns an error on type mismatch or out-of-bounds rows.
    pub fn extend_from(
        &mut self,
        src: &Self,
        rows: impl IntoIterator<Item = usize>,
    ) -> Result<()> {
        self.copy_rows(src, rows.into_iter(), None)
    }

    /// Append `src[rows[i]]` for every `i`, writing NULL instead wherever
    /// `masked[i]` is set. Masked rows are never read from `src`, so they may
    /// carry any placeholder index.
    ///
    /// # Errors
    ///
    /// Returns an error on type mismatch, out-of-bounds rows, or when the
    /// mask is shorter than `rows`.
    pub fn gather_masked(&mut self, src: &Self, rows: &[usize], masked: &[bool]) -> Result<()> {
        if masked.len() < rows.len() {
            return Err(VecJoinError::batch_format(format!(
                "null mask of {} entries is shorter than {} gathered rows",
                masked.len(),
                rows.len()
            )));
        }
        self.copy_rows(src, rows.iter().copied(), Some(masked))
    }

    fn copy_rows(
        &mut self,
        src: &Self,
        rows: impl Iterator<Item = usize>,
        mask: Option<&[bool]>,
    ) -> Result<()> {
        let validity = &mut self.validity;
        match (&mut self.data, &src.data) {
            (ColumnData::Bool(dst), ColumnData::Bool(s)) => {
                copy_fixed(dst, validity, s, &src.validity, rows, mask)
            }
            (ColumnData::Int32(dst), ColumnData::Int32(s)) => {
                copy_fixed(dst, validity, s, &src.validity, rows, mask)
            }
            (ColumnData::Int64(dst), ColumnData::Int64(s)) => {
                copy_fixed(dst, validity, s, &src.validity, rows, mask)
            }
            (ColumnData::Float64(dst), ColumnData::Float64(s)) => {
                copy_fixed(dst, validity, s, &src.validity, rows, mask)
            }
            (
                ColumnData::Text {
                    offsets: dst_offsets,
                    data: dst_data,
                },
                ColumnData::Text { offsets, data },
            )
            | (
                ColumnData::Binary {
                    offsets: dst_offsets,
                    data: dst_data,
                },
                ColumnData::Binary { offsets, data },
            ) => copy_varlen(
                dst_offsets,
                dst_data,
                validity,
                offsets,
                data,
                &src.validity,
                rows,
                mask,
            ),
            (dst, s) => Err(type_mismatch(dst.vector_type(), s.vector_type())),
        }
    }

    /// Copy of rows `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error when the range is out of bounds.
    pub fn window(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(VecJoinError::batch_format(format!(
                "window [{start}, {end}) out of bounds for column of {} rows",
                self.len()
            )));
        }
        let mut out = Self::with_capacity(self.spec.clone(), end - start);
        out.extend_from(self, start..end)?;
        Ok(out)
    }

    /// Approximate heap footprint of the stored values.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.data.byte_size() + self.validity.byte_size()
    }

    /// Drop all rows, keeping allocations.
    pub fn clear(&mut self) {
        self.data.clear();
        self.validity.clear();
    }
}

// ── Batch ──────────────────────────────────────────────────────────────────

/// Fixed-capacity columnar tuple container.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    columns: Vec<Column>,
    row_count: usize,
    capacity: usize,
    selection: Option<SelectionVector>,
}

impl Batch {
    /// Schema-less zero-length batch.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            columns: Vec::new(),
            row_count: 0,
            capacity: 0,
            selection: None,
        }
    }

    /// Zero-length batch carrying `specs` as its schema.
    #[must_use]
    pub fn empty(specs: &[ColumnSpec]) -> Self {
        Self {
            columns: specs
                .iter()
                .map(|spec| Column::with_capacity(spec.clone(), 0))
                .collect(),
            row_count: 0,
            capacity: 0,
            selection: None,
        }
    }

    /// Assemble a batch from equally long columns.
    ///
    /// # Errors
    ///
    /// Returns an error when a column length differs from `row_count`, a
    /// varlen column has malformed offsets, or the batch would exceed
    /// [`MAX_BATCH_ROW_CAPACITY`].
    pub fn from_columns(columns: Vec<Column>, row_count: usize) -> Result<Self> {
        if row_count > MAX_BATCH_ROW_CAPACITY {
            return Err(VecJoinError::batch_format(format!(
                "batch of {row_count} rows exceeds maximum capacity {MAX_BATCH_ROW_CAPACITY}"
            )));
        }
        if let Some(column) = columns.iter().find(|column| column.len() != row_count) {
            return Err(VecJoinError::batch_format(format!(
                "column {} has {} rows, batch has {row_count}",
                column.spec.name,
                column.len()
            )));
        }
        for column in &columns {
            column.data.check_offsets()?;
        }
        Ok(Self {
            columns,
            row_count,
            capacity: row_count,
            selection: None,
        })
    }

    /// Build a batch from row-oriented values.
    ///
    /// # Errors
    ///
    /// Returns an error when a row has the wrong arity, a value does not fit
    /// its column, or `rows` exceeds `capacity`.
    pub fn from_rows(rows: &[Vec<Value>], specs: &[ColumnSpec], capacity: usize) -> Result<Self> {
        if capacity > MAX_BATCH_ROW_CAPACITY {
            return Err(VecJoinError::batch_format(format!(
                "capacity {capacity} exceeds maximum {MAX_BATCH_ROW_CAPACITY}"
            )));
        }
        if rows.len() > capacity {
            return Err(VecJoinError::batch_format(format!(
                "{} rows exceed batch capacity {capacity}",
                rows.len()
            )));
        }
        let mut columns: Vec<Column> = specs
            .iter()
            .map(|spec| Column::with_capacity(spec.clone(), rows.len()))
            .collect();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != specs.len() {
                return Err(VecJoinError::batch_format(format!(
                    "row {row_idx} has {} values, schema has {} columns",
                    row.len(),
                    specs.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push_value(value)?;
            }
        }
        Ok(Self {
            columns,
            row_count: rows.len(),
            capacity,
            selection: None,
        })
    }

    /// Restrict the batch to the rows listed in `selection`.
    ///
    /// # Errors
    ///
    /// Returns an error when a selected index is out of bounds.
    pub fn apply_selection(&mut self, selection: SelectionVector) -> Result<()> {
        if let Some(&bad) = selection
            .as_slice()
            .iter()
            .find(|&&idx| usize::from(idx) >= self.row_count)
        {
            return Err(VecJoinError::batch_format(format!(
                "selection index {bad} out of bounds for batch of {} rows",
                self.row_count
            )));
        }
        self.selection = Some(selection);
        Ok(())
    }

    /// Logical number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selection
            .as_ref()
            .map_or(self.row_count, SelectionVector::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical number of rows stored in the columns.
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    #[must_use]
    pub const fn selection(&self) -> Option<&SelectionVector> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn selection_indices(&self) -> Option<&[u16]> {
        self.selection.as_ref().map(SelectionVector::as_slice)
    }

    /// Physical row backing logical row `logical`.
    #[inline]
    #[must_use]
    pub fn physical_index(&self, logical: usize) -> usize {
        self.selection
            .as_ref()
            .map_or(logical, |sel| usize::from(sel.as_slice()[logical]))
    }

    #[must_use]
    pub fn specs(&self) -> Vec<ColumnSpec> {
        self.columns.iter().map(|column| column.spec.clone()).collect()
    }

    /// Approximate heap footprint of all columns.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(Column::byte_size).sum()
    }

    /// Logical rows as row-oriented values.
    ///
    /// # Errors
    ///
    /// Returns an error when a column cannot be decoded.
    pub fn materialize_rows(&self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::with_capacity(self.len());
        for logical in 0..self.len() {
            let row_idx = self.physical_index(logical);
            let mut row = Vec::with_capacity(self.columns.len());
            for column in &self.columns {
                row.push(column.value_at(row_idx)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn specs() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", ColumnVectorType::Int64),
            ColumnSpec::new("name", ColumnVectorType::Text),
            ColumnSpec::new("score", ColumnVectorType::Float64),
        ]
    }

    fn sample_rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Integer(1), Value::from("a"), Value::Float(0.5)],
            vec![Value::Integer(2), Value::Null, Value::Float(1.5)],
            vec![Value::Null, Value::from("ccc"), Value::Null],
        ]
    }

    #[test]
    fn rows_round_trip_through_batch() {
        let batch = Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.materialize_rows().unwrap(), sample_rows());
    }

    #[test]
    fn selection_restricts_logical_rows() {
        let mut batch =
            Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        batch
            .apply_selection(SelectionVector::from_indices(vec![2, 0]))
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.physical_index(0), 2);
        let rows = batch.materialize_rows().unwrap();
        assert_eq!(rows[0], sample_rows()[2]);
        assert_eq!(rows[1], sample_rows()[0]);
    }

    #[test]
    fn selection_out_of_bounds_is_rejected() {
        let mut batch =
            Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        let err = batch
            .apply_selection(SelectionVector::from_indices(vec![3]))
            .unwrap_err();
        assert!(matches!(err, VecJoinError::BatchFormat(_)));
    }

    #[test]
    fn gather_masked_writes_nulls_without_reading() {
        let batch = Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        let src = &batch.columns()[1];
        let mut out = Column::with_capacity(src.spec.clone(), 3);
        // Index 99 is a placeholder under the mask and must not be read.
        out.gather_masked(src, &[2, 99, 0], &[false, true, false])
            .unwrap();
        assert_eq!(out.value_at(0).unwrap(), Value::from("ccc"));
        assert_eq!(out.value_at(1).unwrap(), Value::Null);
        assert_eq!(out.value_at(2).unwrap(), Value::from("a"));
    }

    #[test]
    fn extend_from_rejects_type_mismatch() {
        let batch = Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        let mut out = Column::with_capacity(ColumnSpec::new("x", ColumnVectorType::Int32), 1);
        let err = out.extend_from(&batch.columns()[0], [0]).unwrap_err();
        assert!(matches!(err, VecJoinError::TypeMismatch { .. }));
    }

    #[test]
    fn window_copies_range() {
        let batch = Batch::from_rows(&sample_rows(), &specs(), DEFAULT_BATCH_ROW_CAPACITY).unwrap();
        let window = batch.columns()[0].window(1, 3).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window.value_at(0).unwrap(), Value::Integer(2));
        assert_eq!(window.value_at(1).unwrap(), Value::Null);
        assert!(batch.columns()[0].window(2, 4).is_err());
    }

    #[test]
    fn int32_overflow_is_reported() {
        let mut column = Column::with_capacity(ColumnSpec::new("x", ColumnVectorType::Int32), 1);
        assert!(column.push_value(&Value::Integer(i64::MAX)).is_err());
        column.push_value(&Value::Integer(-5)).unwrap();
        assert_eq!(column.value_at(0).unwrap(), Value::Integer(-5));
    }

    #[test]
    fn from_columns_checks_lengths() {
        let mut a = Column::with_capacity(ColumnSpec::new("a", ColumnVectorType::Bool), 2);
        a.push_value(&Value::Bool(true)).unwrap();
        let b = Column::with_capacity(ColumnSpec::new("b", ColumnVectorType::Bool), 2);
        assert!(Batch::from_columns(vec![a, b], 1).is_err());
    }

    #[test]
    fn from_columns_rejects_bad_varlen_offsets() {
        let spec = ColumnSpec::new("t", ColumnVectorType::Text);
        for offsets in [vec![0, 4, 2], vec![0, 2, 9], vec![1, 2, 3]] {
            let column = Column {
                spec: spec.clone(),
                data: ColumnData::Text {
                    offsets,
                    data: b"abcd".to_vec(),
                },
                validity: NullBitmap::all_valid(2),
            };
            assert!(matches!(
                Batch::from_columns(vec![column], 2),
                Err(VecJoinError::BatchFormat(_))
            ));
        }
        let good = Column {
            spec,
            data: ColumnData::Text {
                offsets: vec![0, 1, 4],
                data: b"abcd".to_vec(),
            },
            validity: NullBitmap::all_valid(2),
        };
        let batch = Batch::from_columns(vec![good], 2).unwrap();
        assert_eq!(
            batch.materialize_rows().unwrap(),
            vec![vec![Value::from("a")], vec![Value::from("bcd")]]
        );
    }

    #[test]
    fn null_bitmap_ranges() {
        let mut bitmap = NullBitmap::all_valid(10);
        assert_eq!(bitmap.null_count(), 0);
        bitmap.set_null_range(3, 6);
        assert_eq!(bitmap.null_count(), 3);
        assert!(bitmap.is_null(4));
        assert!(bitmap.is_valid(6));
        assert!(bitmap.is_null(10));
    }

    proptest! {
        #[test]
        fn extend_from_matches_row_picks(
            values in proptest::collection::vec(proptest::option::of(any::<i64>()), 1..64),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..64),
        ) {
            let spec = ColumnSpec::new("v", ColumnVectorType::Int64);
            let mut src = Column::with_capacity(spec.clone(), values.len());
            for v in &values {
                src.push_value(&Value::from(*v)).unwrap();
            }
            let rows: Vec<usize> = picks.iter().map(|idx| idx.index(values.len())).collect();
            let mut out = Column::with_capacity(spec, rows.len());
            out.extend_from(&src, rows.iter().copied()).unwrap();
            for (pos, &row) in rows.iter().enumerate() {
                prop_assert_eq!(out.value_at(pos).unwrap(), Value::from(values[row]));
            }
        }
    }
}
