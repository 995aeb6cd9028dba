//! Generic entity store.
//!
//! Maps typed records onto the ledger's byte-oriented, composite-keyed
//! keyspace. A record type describes itself through [`State`]: the class
//! identifier names its namespace and `key_parts` yields the ordered parts
//! of its composite key. [`StateList`] is the only writer of a namespace.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use visanet_ledger::{create_composite_key, split_composite_key, Ledger};

use crate::error::StoreError;

/// Record descriptor for a persisted entity type.
pub trait State: Serialize + DeserializeOwned + Send + Sync {
    /// Namespace of the entity class, e.g. `org.visanet.visaapp`.
    const CLASS: &'static str;

    /// Ordered key parts identifying this record within its class.
    fn key_parts(&self) -> Vec<String>;
}

/// Canonical encoding of a record (a JSON object of its fields).
pub fn serialize<T: State>(record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|source| StoreError::Encode {
        class: T::CLASS,
        source,
    })
}

/// Inverse of [`serialize`].
pub fn deserialize<T: State>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        class: T::CLASS,
        source,
    })
}

/// Human-readable form of a composite key: its parts joined with `:`.
pub fn display_key(key: &str) -> String {
    match split_composite_key(key) {
        Ok((_, parts)) => parts.join(":"),
        Err(_) => key.to_string(),
    }
}

/// The collection of all records of one class.
///
/// Every operation touches exactly one key inside the caller's transaction.
/// Nothing is cached: each `get` reads through to the ledger.
#[derive(Debug)]
pub struct StateList<T: State> {
    _record: PhantomData<fn() -> T>,
}

impl<T: State> Default for StateList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: State> StateList<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }

    /// Composite key for the given key parts in this class's namespace.
    pub fn compose_key(&self, parts: &[&str]) -> Result<String, StoreError> {
        Ok(create_composite_key(T::CLASS, parts)?)
    }

    /// Composite key of an existing record.
    pub fn key_of(&self, record: &T) -> Result<String, StoreError> {
        let parts = record.key_parts();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        self.compose_key(&parts)
    }

    /// Write a new record. Fails with `DuplicateKey` if the key is taken.
    pub async fn add<L: Ledger>(
        &self,
        ledger: &L,
        tx: &mut L::Transaction,
        record: &T,
    ) -> Result<String, StoreError> {
        let key = self.key_of(record)?;
        if ledger.get_state(tx, &key).await?.is_some() {
            return Err(StoreError::DuplicateKey {
                class: T::CLASS,
                key: display_key(&key),
            });
        }
        ledger.put_state(tx, &key, serialize(record)?).await?;
        tracing::debug!(class = T::CLASS, key = %display_key(&key), "added state");
        Ok(key)
    }

    /// Read the record at `key`. Fails with `NotFound` if absent.
    pub async fn get<L: Ledger>(
        &self,
        ledger: &L,
        tx: &mut L::Transaction,
        key: &str,
    ) -> Result<T, StoreError> {
        let bytes = ledger
            .get_state(tx, key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                class: T::CLASS,
                key: display_key(key),
            })?;
        tracing::debug!(class = T::CLASS, key = %display_key(key), "read state");
        deserialize(&bytes)
    }

    /// Overwrite an existing record. Fails with `NotFound` if there is no
    /// prior record, so updates can never stand in for creation.
    pub async fn update<L: Ledger>(
        &self,
        ledger: &L,
        tx: &mut L::Transaction,
        record: &T,
    ) -> Result<(), StoreError> {
        let key = self.key_of(record)?;
        if ledger.get_state(tx, &key).await?.is_none() {
            return Err(StoreError::NotFound {
                class: T::CLASS,
                key: display_key(&key),
            });
        }
        ledger.put_state(tx, &key, serialize(record)?).await?;
        tracing::debug!(class = T::CLASS, key = %display_key(&key), "updated state");
        Ok(())
    }
}
