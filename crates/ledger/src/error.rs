/// All errors that can be returned by a `Ledger` implementation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// MVCC read conflict: a key read inside the transaction was committed
    /// by another transaction before this one committed.
    #[error(
        "concurrent conflict on key {key:?}: read at version {expected_version}, now at version {actual_version}"
    )]
    ConcurrentConflict {
        key: String,
        expected_version: u64,
        actual_version: u64,
    },

    /// The key (or one of its composite parts) is not acceptable to the ledger.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// A rich query string could not be parsed or evaluated.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// `next()` was called on a cursor after `close()`.
    #[error("results iterator already closed")]
    CursorClosed,

    /// A backend-specific error (I/O, persistence format, etc.).
    #[error("ledger backend error: {0}")]
    Backend(String),
}
