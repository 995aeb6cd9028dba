use async_trait::async_trait;

use crate::error::LedgerError;
use crate::record::{KeyModification, KeyValue, TxReceipt};

/// A finite cursor over query or history results.
///
/// Consumers must call `close()` once they are done, whether they drained the
/// cursor or stopped early on an error. Backends may hold resources (open
/// read views, server-side cursors) until then.
#[async_trait]
pub trait ResultsIterator<T: Send>: Send {
    /// The next result, or `None` when the cursor is exhausted.
    async fn next(&mut self) -> Result<Option<T>, LedgerError>;

    /// Release the cursor. Calling `close()` twice is a no-op.
    async fn close(&mut self) -> Result<(), LedgerError>;
}

/// Boxed cursor returned by ledger queries.
pub type BoxedResults<T> = Box<dyn ResultsIterator<T>>;

/// The key/value substrate that VisaNet contracts run on.
///
/// A `Ledger` provides durable point reads and writes grouped into
/// transactions, a per-key version history, prefix scans over composite keys
/// and rich (selector) queries over JSON values.
///
/// ## Transaction Semantics
///
/// All reads and writes made by a contract go through `&mut Self::Transaction`:
///
/// 1. `begin_transaction()` opens a transaction with a fresh transaction id
/// 2. `get_state` / `put_state` / `delete_state` with `&mut tx`
/// 3. `commit_transaction(tx)` validates and applies the transaction
///    OR `abort_transaction(tx)` discards it
///
/// Writes are buffered; nothing is visible to other transactions or to
/// queries until commit. A dropped transaction is never applied.
///
/// ## MVCC Validation
///
/// Every `get_state` records the version it observed. At commit, if any key in
/// that read set has since been committed by another transaction, the commit
/// fails with `LedgerError::ConcurrentConflict` and none of the writes are
/// applied. Callers treat this as a rejected transaction and retry from a
/// fresh read.
///
/// ## Queries
///
/// History, prefix and rich queries read committed state only and are not
/// part of any transaction.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// The in-progress transaction type used by this backend.
    type Transaction: Send;

    // ── Transaction lifecycle ────────────────────────────────────────────────

    /// Begin a new transaction on behalf of the named contract function.
    async fn begin_transaction(&self, function: &str) -> Result<Self::Transaction, LedgerError>;

    /// Validate the read set and apply the write set atomically.
    async fn commit_transaction(&self, tx: Self::Transaction) -> Result<TxReceipt, LedgerError>;

    /// Discard the transaction.
    async fn abort_transaction(&self, tx: Self::Transaction) -> Result<(), LedgerError>;

    /// The id assigned to an open transaction.
    fn transaction_id<'t>(&self, tx: &'t Self::Transaction) -> &'t str;

    // ── Point operations (within transaction) ────────────────────────────────

    /// Read a key, seeing the transaction's own buffered writes.
    ///
    /// Returns `Ok(None)` if the key has no live value.
    async fn get_state(
        &self,
        tx: &mut Self::Transaction,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Buffer a write of `value` at `key`.
    async fn put_state(
        &self,
        tx: &mut Self::Transaction,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError>;

    /// Buffer a delete of `key`. History is preserved; the key stops being live.
    async fn delete_state(&self, tx: &mut Self::Transaction, key: &str) -> Result<(), LedgerError>;

    // ── Query operations (committed state, outside transactions) ─────────────

    /// Every committed version of `key`, oldest first.
    async fn get_history_for_key(
        &self,
        key: &str,
    ) -> Result<BoxedResults<KeyModification>, LedgerError>;

    /// Live keys whose composite key starts with `(object_type, attributes..)`,
    /// in key order.
    async fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<BoxedResults<KeyValue>, LedgerError>;

    /// Live keys whose JSON value matches the rich query, in key order.
    async fn get_query_result(&self, query: &str) -> Result<BoxedResults<KeyValue>, LedgerError>;
}
