pub mod composite;
pub mod conformance;
mod error;
mod identity;
mod memory;
mod record;
pub mod selector;
mod traits;

pub use composite::{create_composite_key, split_composite_key};
pub use error::LedgerError;
pub use identity::CallerIdentity;
pub use memory::{InMemoryLedger, MemoryTransaction};
pub use record::{KeyModification, KeyValue, TxReceipt};
pub use traits::{BoxedResults, Ledger, ResultsIterator};
