//! Result bind buffers for prepared statement fetches.
//!
//! `mysql_stmt_fetch` writes each column into a caller-supplied buffer of a
//! fixed capacity. When a value does not fit, the buffer holds a prefix, the
//! full length is reported, and the fetch returns `MYSQL_DATA_TRUNCATED`. The
//! caller then reads the complete value with `mysql_stmt_fetch_column`.

use crate::error::NativeError;

/// Outcome of one statement fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// A row was written into the column buffers.
    Row,
    /// A row was written, but at least one column was truncated.
    Truncated,
    /// No more rows.
    NoData,
    /// The fetch failed.
    Error(NativeError),
}

/// Fixed-capacity output buffer for one result column.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    data: Vec<u8>,
    capacity: usize,
    length: usize,
    is_null: bool,
}

impl ColumnBuffer {
    /// Create a buffer holding up to `capacity` bytes inline.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            capacity,
            length: 0,
            is_null: false,
        }
    }

    /// Store a fetched value. Returns `true` when the value was truncated.
    ///
    /// The reported [`length`](Self::length) is always the full length of the
    /// value, even if only a prefix fits.
    pub fn fill(&mut self, value: Option<&[u8]>) -> bool {
        match value {
            None => {
                self.is_null = true;
                self.length = 0;
                false
            }
            Some(v) => {
                self.is_null = false;
                self.length = v.len();
                let n = v.len().min(self.capacity);
                self.data[..n].copy_from_slice(&v[..n]);
                v.len() > self.capacity
            }
        }
    }

    /// The buffered value, `None` for NULL.
    ///
    /// For a truncated value this is the prefix that fit.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        if self.is_null {
            None
        } else {
            Some(&self.data[..self.length.min(self.capacity)])
        }
    }

    /// Full length of the last value.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Inline capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the last value was NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Whether the last value did not fit.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        !self.is_null && self.length > self.capacity
    }

    /// Forget the last value.
    pub fn reset(&mut self) {
        self.length = 0;
        self.is_null = false;
    }
}
