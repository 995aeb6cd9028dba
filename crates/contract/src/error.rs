use visanet_ledger::LedgerError;

use crate::visa::ApplicationState;

/// Errors raised by the entity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `add` found a record already present at the key. Add is not an upsert.
    #[error("{class} record {key} already exists")]
    DuplicateKey { class: &'static str, key: String },

    /// `get` or `update` found no record at the key.
    #[error("{class} record {key} does not exist")]
    NotFound { class: &'static str, key: String },

    /// Stored bytes could not be decoded into the record type.
    #[error("malformed {class} record: {source}")]
    Decode {
        class: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("cannot encode {class} record: {source}")]
    Encode {
        class: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors raised by the visa application contract.
///
/// Every error is a rejected transaction: nothing the failing call buffered
/// is committed, and callers re-read state before retrying.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller's organization is not allowed to perform the transition.
    #[error("application {application}: {reason}")]
    Authorization { application: String, reason: String },

    /// The application is in a state from which the transition is illegal.
    #[error("application {application} in state {state}: {reason}")]
    InvalidState {
        application: String,
        state: ApplicationState,
        reason: String,
    },

    /// A prerequisite check has not concluded yet.
    #[error("application {application}: {prerequisite} check is still pending")]
    PendingPrerequisite {
        application: String,
        prerequisite: &'static str,
    },

    #[error("invalid named query supplied: {name}")]
    InvalidQueryName { name: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// A string invocation named an unknown function or had the wrong arguments.
    #[error("{function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
