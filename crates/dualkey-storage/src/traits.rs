//! Storage contracts.

use crate::errors::{Result, StorageError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Column-family key/value store
///
/// Keys and values are bincode-encoded. Composite keys such as
/// `(user_id, slot)` therefore share a byte prefix with their first
/// component, which is what [`Storage::get_by_prefix`] relies on.
///
/// `take` and `update` are the read-modify-write operations;
/// implementations must make each of them atomic per key, and atomic with
/// respect to conditional batch commits.
#[async_trait]
pub trait Storage: Send + Sync {
    /// `Ok(None)` when the key is absent
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Insert or overwrite
    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync;

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync;

    /// Read and delete in one step
    ///
    /// Of any number of concurrent calls on one key, at most one gets
    /// `Some`. Single-use records (challenges, transaction intents) are
    /// consumed through this.
    async fn take<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Rewrite one record in place
    ///
    /// `apply` edits the current value and returns `false` to leave it as
    /// stored. Returns `None` when the key is absent, otherwise whether the
    /// record was rewritten. Two concurrent updates of one key never see
    /// the same starting value.
    async fn update<K, V, F>(&self, cf: &str, key: &K, apply: F) -> Result<Option<bool>>
    where
        K: Serialize + Send + Sync,
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce(&mut V) -> bool + Send;

    /// Entries whose encoded key starts with the encoded `prefix`, in key
    /// byte order
    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Every entry of a column family, in key byte order
    async fn scan<V>(&self, cf: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned;

    fn batch(&self) -> Box<dyn Batch>;
}

/// Write batch applied atomically on commit
///
/// Takes encoded keys and values so it stays object safe; [`BatchExt`]
/// adds the typed variants.
#[async_trait]
pub trait Batch: Send {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()>;

    /// Make the commit conditional on `key` being absent from `cf`
    ///
    /// Checked at commit time; a present key fails the commit with
    /// [`StorageError::Conflict`] and no staged write is applied.
    fn require_absent_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged write
    fn rollback(self: Box<Self>);
}

/// Typed writes for [`Batch`]
pub trait BatchExt: Batch {
    fn put<K, V>(&mut self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize,
        V: Serialize,
    {
        let key_bytes = encode(cf, key)?;
        let value_bytes = encode(cf, value)?;
        self.put_raw(cf, key_bytes, value_bytes)
    }

    fn delete<K>(&mut self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize,
    {
        let key_bytes = encode(cf, key)?;
        self.delete_raw(cf, key_bytes)
    }

    fn require_absent<K>(&mut self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize,
    {
        let key_bytes = encode(cf, key)?;
        self.require_absent_raw(cf, key_bytes)
    }
}

impl<T: Batch + ?Sized> BatchExt for T {}

pub(crate) fn encode<T: Serialize + ?Sized>(cf: &str, value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(StorageError::codec(cf))
}

pub(crate) fn decode<V: DeserializeOwned>(cf: &str, bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(StorageError::codec(cf))
}
