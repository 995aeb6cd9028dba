//! Read-only query façade over one entity namespace.
//!
//! None of these operations open a transaction or mutate state. Every cursor
//! obtained from the ledger is drained and closed before returning, on the
//! error path too.

use serde::Serialize;
use serde_json::{json, Value};
use visanet_ledger::{
    create_composite_key, split_composite_key, BoxedResults, KeyModification, KeyValue, Ledger,
    LedgerError, ResultsIterator,
};

use crate::error::ContractError;
use crate::store::display_key;
use crate::visa::ApplicationState;

/// Precomputed selector shortcuts, one per application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedQuery {
    New,
    DocsCheckPassed,
    DocsCheckFailed,
    HistoryCheckPassed,
    HistoryCheckFailed,
    Approved,
    Declined,
}

impl NamedQuery {
    pub const NAMES: [&'static str; 7] = [
        "new",
        "docschkpassed",
        "docschkfailed",
        "historychkpassed",
        "historychkfailed",
        "approved",
        "declined",
    ];

    pub fn parse(name: &str) -> Result<Self, ContractError> {
        match name {
            "new" => Ok(NamedQuery::New),
            "docschkpassed" => Ok(NamedQuery::DocsCheckPassed),
            "docschkfailed" => Ok(NamedQuery::DocsCheckFailed),
            "historychkpassed" => Ok(NamedQuery::HistoryCheckPassed),
            "historychkfailed" => Ok(NamedQuery::HistoryCheckFailed),
            "approved" => Ok(NamedQuery::Approved),
            "declined" => Ok(NamedQuery::Declined),
            other => Err(ContractError::InvalidQueryName {
                name: other.to_string(),
            }),
        }
    }

    pub fn state(self) -> ApplicationState {
        match self {
            NamedQuery::New => ApplicationState::New,
            NamedQuery::DocsCheckPassed => ApplicationState::DocsCheckPassed,
            NamedQuery::DocsCheckFailed => ApplicationState::DocsCheckFailed,
            NamedQuery::HistoryCheckPassed => ApplicationState::HistoryCheckPassed,
            NamedQuery::HistoryCheckFailed => ApplicationState::HistoryCheckFailed,
            NamedQuery::Approved => ApplicationState::Approved,
            NamedQuery::Declined => ApplicationState::Declined,
        }
    }

    /// The fixed rich-query selector this name stands for.
    pub fn selector(self) -> Value {
        json!({ "selector": { "currentState": self.state().code() } })
    }
}

/// One committed version of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: String,
    pub timestamp: String,
    pub is_delete: bool,
    /// Decoded record with `currentState` shown as its label. Absent for
    /// delete markers; a plain string if the stored bytes are not JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl From<KeyModification> for HistoryEntry {
    fn from(m: KeyModification) -> Self {
        let value = if m.is_delete {
            None
        } else {
            Some(labelled_record(&m.value))
        };
        Self {
            tx_id: m.tx_id,
            timestamp: m.timestamp,
            is_delete: m.is_delete,
            value,
        }
    }
}

/// A key with its current record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    /// Key parts joined with `:`, e.g. `VisaWorld:00001`.
    pub key: String,
    pub record: Value,
}

impl From<KeyValue> for QueryRecord {
    fn from(kv: KeyValue) -> Self {
        Self {
            key: display_key(&kv.key),
            record: decode_or_string(&kv.value),
        }
    }
}

fn decode_or_string(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn labelled_record(bytes: &[u8]) -> Value {
    let mut value = decode_or_string(bytes);
    if let Some(state) = value.get_mut("currentState") {
        let label = state
            .as_u64()
            .map_or("UNKNOWN", ApplicationState::label_for_code);
        *state = Value::String(label.to_string());
    }
    value
}

/// Query façade bound to one namespace.
pub struct QueryUtils<'a, L: Ledger> {
    ledger: &'a L,
    namespace: &'a str,
}

impl<'a, L: Ledger> QueryUtils<'a, L> {
    pub fn new(ledger: &'a L, namespace: &'a str) -> Self {
        Self { ledger, namespace }
    }

    /// Every committed version of `(submitter, application_number)`, oldest first.
    pub async fn get_asset_history(
        &self,
        submitter: &str,
        application_number: &str,
    ) -> Result<Vec<HistoryEntry>, ContractError> {
        let key = create_composite_key(self.namespace, &[submitter, application_number])?;
        tracing::debug!(namespace = self.namespace, key = %display_key(&key), "history query");
        let cursor = self.ledger.get_history_for_key(&key).await?;
        let versions = collect(cursor).await?;
        Ok(versions.into_iter().map(HistoryEntry::from).collect())
    }

    /// Records whose first key part equals `prefix`.
    pub async fn query_key_by_partial(
        &self,
        prefix: &str,
    ) -> Result<Vec<QueryRecord>, ContractError> {
        tracing::debug!(namespace = self.namespace, prefix, "partial key query");
        let cursor = self
            .ledger
            .get_state_by_partial_composite_key(self.namespace, &[prefix])
            .await?;
        let found = collect(cursor).await?;
        Ok(found.into_iter().map(QueryRecord::from).collect())
    }

    /// Records whose `owner` field equals `owner`.
    pub async fn query_key_by_owner(&self, owner: &str) -> Result<Vec<QueryRecord>, ContractError> {
        let query = json!({ "selector": { "owner": owner } });
        self.rich_query(&query.to_string()).await
    }

    /// Run a caller-supplied rich query as is.
    pub async fn query_by_adhoc(&self, query: &str) -> Result<Vec<QueryRecord>, ContractError> {
        if query.trim().is_empty() {
            return Err(ContractError::InvalidQuery {
                reason: "query string must not be empty".to_string(),
            });
        }
        serde_json::from_str::<Value>(query).map_err(|e| ContractError::InvalidQuery {
            reason: e.to_string(),
        })?;
        self.rich_query(query).await
    }

    /// Run one of the [`NamedQuery`] shortcuts by name.
    pub async fn query_named(&self, name: &str) -> Result<Vec<QueryRecord>, ContractError> {
        let named = NamedQuery::parse(name)?;
        self.rich_query(&named.selector().to_string()).await
    }

    /// Run a rich query and keep only this namespace's records.
    ///
    /// The ledger evaluates the selector across every namespace, so `limit`
    /// is held back and applied after filtering.
    async fn rich_query(&self, query: &str) -> Result<Vec<QueryRecord>, ContractError> {
        tracing::debug!(namespace = self.namespace, query, "rich query");
        let (query, limit) = split_limit(query)?;
        let cursor = self
            .ledger
            .get_query_result(&query)
            .await
            .map_err(|e| match e {
                LedgerError::InvalidQuery { reason } => ContractError::InvalidQuery { reason },
                other => ContractError::Ledger(other),
            })?;
        let found = collect(cursor).await?;
        Ok(found
            .into_iter()
            .filter(|kv| self.in_namespace(&kv.key))
            .take(limit.unwrap_or(usize::MAX))
            .map(QueryRecord::from)
            .collect())
    }

    fn in_namespace(&self, key: &str) -> bool {
        matches!(split_composite_key(key), Ok((object_type, _)) if object_type == self.namespace)
    }
}

/// Remove `limit` from a rich query, returning the rest of the query and
/// the limit if one was given.
fn split_limit(query: &str) -> Result<(String, Option<usize>), ContractError> {
    let invalid = |reason: String| ContractError::InvalidQuery { reason };
    let mut doc: Value = serde_json::from_str(query).map_err(|e| invalid(e.to_string()))?;
    let limit = match doc.as_object_mut().and_then(|obj| obj.remove("limit")) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            invalid("\"limit\" must be a non-negative integer".to_string())
        })? as usize),
    };
    Ok((doc.to_string(), limit))
}

/// Drain a cursor, closing it whether or not draining succeeded.
async fn collect<T: Send + 'static>(mut cursor: BoxedResults<T>) -> Result<Vec<T>, LedgerError> {
    let mut items = Vec::new();
    let drained = loop {
        match cursor.next().await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let closed = cursor.close().await;
    drained?;
    closed?;
    Ok(items)
}
