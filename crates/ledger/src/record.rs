use serde::{Deserialize, Serialize};

/// A live key and its current committed value, as returned by range and
/// rich queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(with = "crate::memory::base64_bytes")]
    pub value: Vec<u8>,
}

/// One committed version of a key, as returned by history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyModification {
    pub tx_id: String,
    /// RFC 3339 timestamp string of the committing transaction.
    pub timestamp: String,
    pub is_delete: bool,
    /// Empty when `is_delete` is set.
    #[serde(with = "crate::memory::base64_bytes")]
    pub value: Vec<u8>,
}

/// Summary of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    /// RFC 3339 timestamp string.
    pub timestamp: String,
    /// Number of keys written (puts and deletes).
    pub writes: usize,
}
