//! Column and describe-info types.
//!
//! These mirror what a DESCRIBE-INFO message carries (spec. §6 GLOSSARY)
//! without parsing any of the underlying bytes: the decoder builds these,
//! the engine only inspects and occasionally rewrites them.

/// Oracle column data types the engine needs to reason about.
///
/// This is not an exhaustive wire-format type catalogue (that lives in the
/// out-of-scope column codec); it only distinguishes the handful of types
/// the engine itself branches on, namely LOBs and their LONG fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleType {
    /// VARCHAR2 / CHAR family.
    Varchar,
    /// NUMBER.
    Number,
    /// DATE.
    Date,
    /// TIMESTAMP family.
    Timestamp,
    /// RAW.
    Raw,
    /// ROWID.
    Rowid,
    /// VECTOR.
    Vector,
    /// JSON (OSON).
    Json,
    /// CLOB.
    Clob,
    /// BLOB.
    Blob,
    /// NCLOB.
    Nclob,
    /// LONG (the non-LOB fallback for CLOB).
    Long,
    /// LONG RAW (the non-LOB fallback for BLOB).
    LongRaw,
    /// LONG in an NVARCHAR collation (the non-LOB fallback for NCLOB).
    LongNvarchar,
    /// A type the engine does not special-case, identified by its wire code.
    Other(u16),
}

impl OracleType {
    /// Whether this is one of the three LOB column types.
    #[must_use]
    pub fn is_lob(self) -> bool {
        matches!(self, Self::Clob | Self::Blob | Self::Nclob)
    }

    /// The non-LOB type a caller opting out of full LOB fetch should see
    /// instead (spec. §4.3 describe-driven re-execute).
    #[must_use]
    pub fn long_fallback(self) -> Option<Self> {
        match self {
            Self::Clob => Some(Self::Long),
            Self::Blob => Some(Self::LongRaw),
            Self::Nclob => Some(Self::LongNvarchar),
            _ => None,
        }
    }
}

/// Metadata for a single output column (or, reused, a PL/SQL bind value).
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name as returned by the server.
    pub name: String,
    /// Oracle data type.
    pub oracle_type: OracleType,
    /// Maximum byte size of the column's wire representation.
    pub size: u32,
    /// Decimal precision (NUMBER columns); 0 if not applicable.
    pub precision: i16,
    /// Decimal scale (NUMBER columns); 0 if not applicable.
    pub scale: i16,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl Column {
    /// Convenience constructor for a simple, non-numeric column.
    #[must_use]
    pub fn new(name: impl Into<String>, oracle_type: OracleType, size: u32) -> Self {
        Self {
            name: name.into(),
            oracle_type,
            size,
            precision: 0,
            scale: 0,
            nullable: true,
        }
    }
}

/// Column metadata for an entire result set, as returned by DESCRIBE-INFO.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeInfo {
    /// Columns in server-defined order.
    pub columns: Vec<Column>,
}

impl DescribeInfo {
    /// An empty describe (zero columns); used for the "no rows at all"
    /// boundary case.
    #[must_use]
    pub fn empty() -> Self {
        Self { columns: Vec::new() }
    }

    /// Whether any column is a LOB type.
    #[must_use]
    pub fn has_lob_columns(&self) -> bool {
        self.columns.iter().any(|c| c.oracle_type.is_lob())
    }

    /// Coerce every LOB column to its LONG/LONG RAW/LONG NVARCHAR fallback.
    ///
    /// Used by the describe-driven re-execute path when the caller opted
    /// out of fetching full LOB values (spec. §4.3).
    #[must_use]
    pub fn rewrite_lobs_as_long(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if let Some(fallback) = c.oracle_type.long_fallback() {
                    c.oracle_type = fallback;
                }
                c
            })
            .collect();
        Self { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_lobs_as_long_coerces_only_lob_columns() {
        let describe = DescribeInfo {
            columns: vec![
                Column::new("ID", OracleType::Number, 22),
                Column::new("DOC", OracleType::Clob, 0),
                Column::new("PHOTO", OracleType::Blob, 0),
                Column::new("NOTE", OracleType::Nclob, 0),
            ],
        };
        assert!(describe.has_lob_columns());
        let rewritten = describe.rewrite_lobs_as_long();
        assert_eq!(rewritten.columns[0].oracle_type, OracleType::Number);
        assert_eq!(rewritten.columns[1].oracle_type, OracleType::Long);
        assert_eq!(rewritten.columns[2].oracle_type, OracleType::LongRaw);
        assert_eq!(rewritten.columns[3].oracle_type, OracleType::LongNvarchar);
        assert!(!rewritten.has_lob_columns());
    }

    #[test]
    fn empty_describe_has_no_lob_columns() {
        assert!(!DescribeInfo::empty().has_lob_columns());
    }
}
