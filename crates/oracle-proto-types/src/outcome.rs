//! The result a completed statement hands back to its caller.

use crate::describe::DescribeInfo;

/// What a statement completer is resolved with on success.
///
/// Deliberately does not carry affected-row counts or a last-rowid: parsing
/// those out of a completion token is itself column/message-codec work and
/// stays with the out-of-scope decoder, same as individual column values.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// A query, together with the column metadata for the rows that will
    /// stream through the row buffer.
    Query(DescribeInfo),
    /// A DML/DDL/PL-SQL command with no result set.
    Command,
}

impl StatementOutcome {
    /// The describe info, if this outcome is a query.
    #[must_use]
    pub fn describe(&self) -> Option<&DescribeInfo> {
        match self {
            Self::Query(describe) => Some(describe),
            Self::Command => None,
        }
    }
}
