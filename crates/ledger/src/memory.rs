//! In-memory `Ledger` backend.
//!
//! Keeps every committed version of every key, validates transactions with
//! MVCC read-set checks and can be persisted to a JSON file between process
//! runs.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::composite::create_composite_key;
use crate::error::LedgerError;
use crate::record::{KeyModification, KeyValue, TxReceipt};
use crate::selector::RichQuery;
use crate::traits::{BoxedResults, Ledger, ResultsIterator};

/// Committed world state: full version list per key plus the transaction counter.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WorldState {
    sequence: u64,
    keys: BTreeMap<String, Vec<KeyModification>>,
}

impl WorldState {
    fn version(&self, key: &str) -> u64 {
        self.keys.get(key).map_or(0, |h| h.len() as u64)
    }

    fn live_value(&self, key: &str) -> Option<&[u8]> {
        live(self.keys.get(key)?)
    }

    fn live_entries(&self) -> impl Iterator<Item = (&String, &[u8])> {
        self.keys
            .iter()
            .filter_map(|(k, history)| live(history).map(|v| (k, v)))
    }
}

fn live(history: &[KeyModification]) -> Option<&[u8]> {
    match history.last() {
        Some(m) if !m.is_delete => Some(&m.value),
        _ => None,
    }
}

/// A transaction against an [`InMemoryLedger`].
#[derive(Debug)]
pub struct MemoryTransaction {
    tx_id: String,
    function: String,
    /// Key -> version observed on first read.
    reads: BTreeMap<String, u64>,
    /// Key -> buffered value (`None` = delete).
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

/// An in-memory ledger, safe to share across tasks.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<WorldState>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursors handed out by queries that have not been closed yet.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Load a ledger previously written with [`InMemoryLedger::save`].
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LedgerError::Backend(format!("reading {}: {}", path.display(), e)))?;
        let state: WorldState = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Backend(format!("parsing {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), keys = state.keys.len(), "loaded ledger");
        Ok(Self {
            state: RwLock::new(state),
            open_cursors: Arc::default(),
        })
    }

    /// Write the committed world state (including history) to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let state = self.state.read().await;
        let bytes = serde_json::to_vec_pretty(&*state)
            .map_err(|e| LedgerError::Backend(format!("encoding ledger: {}", e)))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| LedgerError::Backend(format!("writing {}: {}", path.display(), e)))
    }

    fn cursor<T: Send + 'static>(&self, items: Vec<T>) -> BoxedResults<T> {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryResults {
            items: items.into(),
            open: true,
            open_cursors: Arc::clone(&self.open_cursors),
        })
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    type Transaction = MemoryTransaction;

    async fn begin_transaction(&self, function: &str) -> Result<MemoryTransaction, LedgerError> {
        let sequence = {
            let mut state = self.state.write().await;
            state.sequence += 1;
            state.sequence
        };
        let nonce: [u8; 24] = rand::random();
        let tx_id = transaction_id(&nonce, function, sequence);
        tracing::debug!(tx_id = %tx_id, function, "begin transaction");
        Ok(MemoryTransaction {
            tx_id,
            function: function.to_string(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        })
    }

    async fn commit_transaction(&self, tx: MemoryTransaction) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.write().await;

        for (key, expected) in &tx.reads {
            let actual = state.version(key);
            if actual != *expected {
                tracing::debug!(tx_id = %tx.tx_id, key = %key, expected, actual, "mvcc conflict");
                return Err(LedgerError::ConcurrentConflict {
                    key: key.clone(),
                    expected_version: *expected,
                    actual_version: actual,
                });
            }
        }

        let timestamp = now_rfc3339()?;
        let writes = tx.writes.len();
        for (key, value) in tx.writes {
            let (is_delete, value) = match value {
                Some(v) => (false, v),
                None => (true, Vec::new()),
            };
            state.keys.entry(key).or_default().push(KeyModification {
                tx_id: tx.tx_id.clone(),
                timestamp: timestamp.clone(),
                is_delete,
                value,
            });
        }

        tracing::debug!(tx_id = %tx.tx_id, function = %tx.function, writes, "commit transaction");
        Ok(TxReceipt {
            tx_id: tx.tx_id,
            timestamp,
            writes,
        })
    }

    async fn abort_transaction(&self, tx: MemoryTransaction) -> Result<(), LedgerError> {
        tracing::debug!(tx_id = %tx.tx_id, function = %tx.function, "abort transaction");
        Ok(())
    }

    fn transaction_id<'t>(&self, tx: &'t MemoryTransaction) -> &'t str {
        &tx.tx_id
    }

    async fn get_state(
        &self,
        tx: &mut MemoryTransaction,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        validate_key(key)?;
        if let Some(buffered) = tx.writes.get(key) {
            return Ok(buffered.clone());
        }
        let state = self.state.read().await;
        tx.reads
            .entry(key.to_string())
            .or_insert_with(|| state.version(key));
        Ok(state.live_value(key).map(<[u8]>::to_vec))
    }

    async fn put_state(
        &self,
        tx: &mut MemoryTransaction,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError> {
        validate_key(key)?;
        tx.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    async fn delete_state(&self, tx: &mut MemoryTransaction, key: &str) -> Result<(), LedgerError> {
        validate_key(key)?;
        tx.writes.insert(key.to_string(), None);
        Ok(())
    }

    async fn get_history_for_key(
        &self,
        key: &str,
    ) -> Result<BoxedResults<KeyModification>, LedgerError> {
        validate_key(key)?;
        let history = self
            .state
            .read()
            .await
            .keys
            .get(key)
            .cloned()
            .unwrap_or_default();
        Ok(self.cursor(history))
    }

    async fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<BoxedResults<KeyValue>, LedgerError> {
        let prefix = create_composite_key(object_type, attributes)?;
        let state = self.state.read().await;
        let matches: Vec<KeyValue> = state
            .keys
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, history)| {
                live(history).map(|v| KeyValue {
                    key: k.clone(),
                    value: v.to_vec(),
                })
            })
            .collect();
        drop(state);
        Ok(self.cursor(matches))
    }

    async fn get_query_result(&self, query: &str) -> Result<BoxedResults<KeyValue>, LedgerError> {
        let query = RichQuery::parse(query)?;
        let state = self.state.read().await;
        let matches: Vec<KeyValue> = state
            .live_entries()
            .filter(|(_, v)| {
                serde_json::from_slice::<serde_json::Value>(v)
                    .map(|doc| query.matches(&doc))
                    .unwrap_or(false)
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.to_vec(),
            })
            .collect();
        drop(state);
        Ok(self.cursor(matches))
    }
}

/// Cursor over a materialized result set.
struct MemoryResults<T> {
    items: VecDeque<T>,
    open: bool,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl<T: Send + 'static> ResultsIterator<T> for MemoryResults<T> {
    async fn next(&mut self) -> Result<Option<T>, LedgerError> {
        if !self.open {
            return Err(LedgerError::CursorClosed);
        }
        Ok(self.items.pop_front())
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        if self.open {
            self.open = false;
            self.items.clear();
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl<T> Drop for MemoryResults<T> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("results iterator dropped without close()");
        }
    }
}

fn validate_key(key: &str) -> Result<(), LedgerError> {
    if key.is_empty() {
        return Err(LedgerError::InvalidKey {
            reason: "key must not be empty".to_string(),
        });
    }
    Ok(())
}

fn transaction_id(nonce: &[u8], function: &str, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(function.as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn now_rfc3339() -> Result<String, LedgerError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| LedgerError::Backend(format!("formatting timestamp: {}", e)))
}

/// Serde adapter storing byte values as base64 strings in the persisted ledger.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put_committed(ledger: &InMemoryLedger, key: &str, value: &[u8]) -> TxReceipt {
        let mut tx = ledger.begin_transaction("put").await.unwrap();
        ledger.put_state(&mut tx, key, value.to_vec()).await.unwrap();
        ledger.commit_transaction(tx).await.unwrap()
    }

    #[tokio::test]
    async fn transaction_ids_are_unique_hex() {
        let ledger = InMemoryLedger::new();
        let a = ledger.begin_transaction("f").await.unwrap();
        let b = ledger.begin_transaction("f").await.unwrap();
        assert_eq!(a.tx_id.len(), 64);
        assert!(a.tx_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.tx_id, b.tx_id);
    }

    #[tokio::test]
    async fn reads_see_own_writes() {
        let ledger = InMemoryLedger::new();
        let mut tx = ledger.begin_transaction("f").await.unwrap();
        ledger.put_state(&mut tx, "k", b"v".to_vec()).await.unwrap();
        assert_eq!(
            ledger.get_state(&mut tx, "k").await.unwrap(),
            Some(b"v".to_vec())
        );
        ledger.delete_state(&mut tx, "k").await.unwrap();
        assert_eq!(ledger.get_state(&mut tx, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_records_each_commit() {
        let ledger = InMemoryLedger::new();
        let first = put_committed(&ledger, "k", b"1").await;
        let second = put_committed(&ledger, "k", b"2").await;

        let mut cursor = ledger.get_history_for_key("k").await.unwrap();
        let a = cursor.next().await.unwrap().unwrap();
        let b = cursor.next().await.unwrap().unwrap();
        assert!(cursor.next().await.unwrap().is_none());
        cursor.close().await.unwrap();

        assert_eq!((a.tx_id, a.value), (first.tx_id, b"1".to_vec()));
        assert_eq!((b.tx_id, b.value), (second.tx_id, b"2".to_vec()));
        assert!(OffsetDateTime::parse(&b.timestamp, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn open_cursor_count_tracks_close() {
        let ledger = InMemoryLedger::new();
        put_committed(&ledger, "k", b"{}").await;
        let mut cursor = ledger.get_history_for_key("k").await.unwrap();
        assert_eq!(ledger.open_cursors(), 1);
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert_eq!(ledger.open_cursors(), 0);
        assert!(matches!(
            cursor.next().await,
            Err(LedgerError::CursorClosed)
        ));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = InMemoryLedger::new();
        put_committed(&ledger, "k", &[0, 159, 255]).await;
        put_committed(&ledger, "k", b"next").await;
        ledger.save(&path).await.unwrap();

        let restored = InMemoryLedger::load(&path).await.unwrap();
        let mut tx = restored.begin_transaction("get").await.unwrap();
        assert_eq!(
            restored.get_state(&mut tx, "k").await.unwrap(),
            Some(b"next".to_vec())
        );
        let mut cursor = restored.get_history_for_key("k").await.unwrap();
        let first = cursor.next().await.unwrap().unwrap();
        cursor.close().await.unwrap();
        assert_eq!(first.value, vec![0, 159, 255]);
    }

    #[tokio::test]
    async fn load_missing_file_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = InMemoryLedger::load(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(LedgerError::Backend(_))));
    }
}
