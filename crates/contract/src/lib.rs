//! Visa application approval workflow.
//!
//! A typed entity store over the ledger's composite-keyed keyspace, the visa
//! application entity, the organization-gated workflow engine that moves it
//! through its lifecycle and a read-only query façade over the same
//! namespace.

pub mod contract;
mod error;
pub mod invoke;
pub mod queries;
pub mod store;
pub mod visa;

pub use contract::{
    authorize, TransactionContext, Transition, TransitionRequest, VisaApplicationContract,
    DN_ATTRIBUTE,
};
pub use error::{ContractError, StoreError};
pub use invoke::Invocation;
pub use queries::{HistoryEntry, NamedQuery, QueryRecord, QueryUtils};
pub use store::{State, StateList};
pub use visa::{ApplicationState, CheckStatus, VisaApplication, VISA_APPLICATION_CLASS};
