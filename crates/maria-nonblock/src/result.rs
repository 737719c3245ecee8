//! Stored result sets.
//!
//! A stored result is what `mysql_store_result` returns: every row of the
//! result set buffered on the client. Row data lives in one contiguous
//! [`Bytes`] buffer, and each column of each row is a [`ColumnSlice`] into it,
//! so fetching a row hands out borrowed slices without copying.

use bytes::{BufMut, Bytes, BytesMut};

/// Location of one column value inside the row buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSlice {
    /// Offset into the buffer.
    pub offset: u32,
    /// Length of the value in bytes.
    pub length: u32,
    /// Whether the value is SQL NULL.
    pub is_null: bool,
}

impl ColumnSlice {
    /// A NULL column.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            offset: 0,
            length: 0,
            is_null: true,
        }
    }

    /// A non-NULL column.
    #[must_use]
    pub const fn new(offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            is_null: false,
        }
    }
}

/// A fully buffered result set.
#[derive(Debug, Clone)]
pub struct StoredResult {
    data: Bytes,
    slices: Vec<ColumnSlice>,
    num_fields: usize,
    cursor: usize,
}

impl StoredResult {
    /// Number of columns (`mysql_num_fields`).
    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// Number of rows (`mysql_num_rows`).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        if self.num_fields == 0 {
            0
        } else {
            self.slices.len() / self.num_fields
        }
    }

    /// Fetch the next row (`mysql_fetch_row`), or `None` once exhausted.
    pub fn fetch_row(&mut self) -> Option<RawRow<'_>> {
        if self.cursor >= self.num_rows() {
            return None;
        }
        let start = self.cursor * self.num_fields;
        self.cursor += 1;
        Some(RawRow {
            data: &self.data,
            slices: &self.slices[start..start + self.num_fields],
        })
    }

    /// Reset the row cursor to the first row.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// One row of a [`StoredResult`], borrowing its buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    data: &'a Bytes,
    slices: &'a [ColumnSlice],
}

impl<'a> RawRow<'a> {
    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Raw bytes of a column, `None` for NULL or out-of-range indexes.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let slice = self.slices.get(index)?;
        if slice.is_null {
            return None;
        }
        let start = slice.offset as usize;
        let end = start + slice.length as usize;
        self.data.get(start..end)
    }

    /// Column value as a zero-copy [`Bytes`] handle.
    #[must_use]
    pub fn get_bytes(&self, index: usize) -> Option<Bytes> {
        let slice = self.slices.get(index)?;
        if slice.is_null {
            return None;
        }
        let start = slice.offset as usize;
        let end = start + slice.length as usize;
        if end > self.data.len() {
            return None;
        }
        Some(self.data.slice(start..end))
    }

    /// Column lengths (`mysql_fetch_lengths`).
    pub fn lengths(&self) -> impl Iterator<Item = usize> + 'a {
        self.slices.iter().map(|s| s.length as usize)
    }
}

/// Incremental builder for a [`StoredResult`].
///
/// Used by native library implementations while reading rows off the wire.
#[derive(Debug, Default)]
pub struct StoredResultBuilder {
    data: BytesMut,
    slices: Vec<ColumnSlice>,
    num_fields: usize,
}

impl StoredResultBuilder {
    /// Start a result with `num_fields` columns.
    #[must_use]
    pub fn new(num_fields: usize) -> Self {
        Self {
            data: BytesMut::new(),
            slices: Vec::new(),
            num_fields,
        }
    }

    /// Append one row. Returns `false` if the column count does not match.
    pub fn push_row<I, V>(&mut self, values: I) -> bool
    where
        I: IntoIterator<Item = Option<V>>,
        V: AsRef<[u8]>,
    {
        let mark = self.slices.len();
        for value in values {
            match value {
                Some(v) => {
                    let v = v.as_ref();
                    let offset = self.data.len() as u32;
                    self.data.put_slice(v);
                    self.slices.push(ColumnSlice::new(offset, v.len() as u32));
                }
                None => self.slices.push(ColumnSlice::null()),
            }
        }
        if self.slices.len() - mark != self.num_fields {
            self.slices.truncate(mark);
            return false;
        }
        true
    }

    /// Number of rows pushed so far.
    #[must_use]
    pub fn row_count(&self) -> usize {
        if self.num_fields == 0 {
            0
        } else {
            self.slices.len() / self.num_fields
        }
    }

    /// Freeze into a [`StoredResult`].
    #[must_use]
    pub fn finish(self) -> StoredResult {
        StoredResult {
            data: self.data.freeze(),
            slices: self.slices,
            num_fields: self.num_fields,
            cursor: 0,
        }
    }
}
