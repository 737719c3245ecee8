//! Result materialization.
//!
//! Converts the library's raw row buffers into [`RowSet`]s. Used by both the
//! simple query path (stored results) and the prepared statement path
//! (column buffers).

use bytes::Bytes;
use maria_nonblock::{ColumnBuffer, StoredResult};

use crate::row::{Row, RowSet, Value};

/// Materialize every remaining row of a stored result.
///
/// Column order is preserved. Values share the result's buffer.
pub fn stored_result(result: &mut StoredResult) -> RowSet {
    let mut set = RowSet::empty();
    while let Some(raw) = result.fetch_row() {
        let values = (0..raw.len()).map(|i| raw.get_bytes(i)).collect();
        set.push(Row::new(values));
    }
    set
}

/// Copy the current contents of statement column buffers into a row.
///
/// Truncated columns must already have been replaced by the caller; here
/// they are copied as the prefix that fit.
#[must_use]
pub fn column_buffers(columns: &[ColumnBuffer]) -> Row {
    Row::new(columns.iter().map(column_value).collect())
}

/// The value held by one column buffer.
#[must_use]
pub fn column_value(column: &ColumnBuffer) -> Value {
    column.value().map(Bytes::copy_from_slice)
}
