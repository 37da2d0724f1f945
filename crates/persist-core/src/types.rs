//! SQL type tags attached to attributes and cells.

use serde::{Deserialize, Serialize};

/// Dialect-neutral SQL type of a column.
///
/// Drivers use the tag to bind values; the DDL generator maps it to a
/// concrete column type per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SqlType {
    /// Boolean flag.
    Boolean,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer; also used for ids, foreign keys and epoch-millis stamps.
    #[default]
    BigInt,
    /// Double precision float.
    Double,
    /// Arbitrary precision decimal, carried as text.
    Decimal,
    /// Unbounded text.
    Text,
    /// Binary data.
    Blob,
    /// Calendar date.
    Date,
    /// Point in time.
    Timestamp,
    /// JSON document.
    Json,
}

impl SqlType {
    /// Whether values of this type are integral.
    pub const fn is_integral(self) -> bool {
        matches!(self, SqlType::Integer | SqlType::BigInt)
    }
}
