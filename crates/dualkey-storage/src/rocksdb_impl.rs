//! RocksDB backend.

use crate::{
    column_families::all_column_families,
    errors::{Result, StorageError},
    traits::{decode, encode, Batch, Storage},
};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tempfile::TempDir;
use tracing::{debug, info};

/// RocksDB-backed [`Storage`]
pub struct RocksDbStorage {
    db: Arc<DB>,
    // Held across the read and the write of `take` and `update`, and
    // across a batch's precondition check and write
    rmw: Arc<Mutex<()>>,
    _scratch: Option<TempDir>,
}

impl RocksDbStorage {
    /// Open (or create) the database at `path` with every column family
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = open_db(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Storage opened");
        Ok(Self::from_db(db, None))
    }

    /// Fresh database in a temporary directory, removed on drop
    ///
    /// Public so other crates' tests can use it.
    pub fn open_test() -> Result<Self> {
        let scratch = TempDir::new()?;
        let db = open_db(scratch.path())?;
        Ok(Self::from_db(db, Some(scratch)))
    }

    fn from_db(db: DB, scratch: Option<TempDir>) -> Self {
        Self {
            db: Arc::new(db),
            rmw: Arc::new(Mutex::new(())),
            _scratch: scratch,
        }
    }

    fn handle(&self, cf: &str) -> Result<&ColumnFamily> {
        column_family(&self.db, cf)
    }

    fn read_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get_cf(self.handle(cf)?, key)
            .map_err(StorageError::database(cf))
    }

    fn write_raw(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .put_cf(self.handle(cf)?, key, value)
            .map_err(StorageError::database(cf))
    }

    fn rmw_guard(&self) -> MutexGuard<'_, ()> {
        lock(&self.rmw)
    }

    /// Collect entries from `start` onwards while `prefix` matches
    fn collect<V: DeserializeOwned>(
        &self,
        cf: &str,
        start: &[u8],
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, V)>> {
        let mode = IteratorMode::From(start, Direction::Forward);
        let mut entries = Vec::new();

        for item in self.db.iterator_cf(self.handle(cf)?, mode) {
            let (key, value) = item.map_err(StorageError::database(cf))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), decode(cf, &value)?));
        }

        Ok(entries)
    }
}

// The guarded unit is `()`, so a poisoned lock carries no broken state.
fn lock(rmw: &Mutex<()>) -> MutexGuard<'_, ()> {
    rmw.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn column_family<'a>(db: &'a DB, cf: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(cf)
        .ok_or_else(|| StorageError::UnknownColumnFamily(cf.to_string()))
}

fn open_db(path: &Path) -> Result<DB> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let db = DB::open_cf(&opts, path, all_column_families())
        .map_err(|e| StorageError::Open(e.to_string()))?;
    debug!(?path, "RocksDB column families ready");
    Ok(db)
}

#[async_trait]
impl Storage for RocksDbStorage {
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        match self.read_raw(cf, &encode(cf, key)?)? {
            Some(bytes) => decode(cf, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync,
    {
        self.write_raw(cf, &encode(cf, key)?, &encode(cf, value)?)
    }

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync,
    {
        self.db
            .delete_cf(self.handle(cf)?, encode(cf, key)?)
            .map_err(StorageError::database(cf))
    }

    async fn take<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let key = encode(cf, key)?;

        let taken = {
            let _guard = self.rmw_guard();
            let bytes = self.read_raw(cf, &key)?;
            if bytes.is_some() {
                self.db
                    .delete_cf(self.handle(cf)?, &key)
                    .map_err(StorageError::database(cf))?;
            }
            bytes
        };

        match taken {
            Some(bytes) => decode(cf, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn update<K, V, F>(&self, cf: &str, key: &K, apply: F) -> Result<Option<bool>>
    where
        K: Serialize + Send + Sync,
        V: Serialize + DeserializeOwned + Send,
        F: FnOnce(&mut V) -> bool + Send,
    {
        let key = encode(cf, key)?;

        let _guard = self.rmw_guard();
        let Some(bytes) = self.read_raw(cf, &key)? else {
            return Ok(None);
        };
        let mut value: V = decode(cf, &bytes)?;
        if !apply(&mut value) {
            return Ok(Some(false));
        }
        self.write_raw(cf, &key, &encode(cf, &value)?)?;
        Ok(Some(true))
    }

    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let prefix = encode(cf, prefix)?;
        self.collect(cf, &prefix, &prefix)
    }

    async fn scan<V>(&self, cf: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned,
    {
        self.collect(cf, &[], &[])
    }

    fn batch(&self) -> Box<dyn Batch> {
        Box::new(RocksDbBatch {
            db: Arc::clone(&self.db),
            rmw: Arc::clone(&self.rmw),
            absent: Vec::new(),
            writes: WriteBatch::default(),
        })
    }
}

/// Staged writes against a [`RocksDbStorage`]
pub struct RocksDbBatch {
    db: Arc<DB>,
    rmw: Arc<Mutex<()>>,
    absent: Vec<(String, Vec<u8>)>,
    writes: WriteBatch,
}

#[async_trait]
impl Batch for RocksDbBatch {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let handle = column_family(&self.db, cf)?;
        self.writes.put_cf(handle, key, value);
        Ok(())
    }

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()> {
        let handle = column_family(&self.db, cf)?;
        self.writes.delete_cf(handle, key);
        Ok(())
    }

    fn require_absent_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()> {
        column_family(&self.db, cf)?;
        self.absent.push((cf.to_string(), key));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let RocksDbBatch {
            db,
            rmw,
            absent,
            writes,
        } = *self;
        let staged = writes.len();

        let _guard = lock(&rmw);
        for (cf, key) in &absent {
            let present = db
                .get_pinned_cf(column_family(&db, cf)?, key)
                .map_err(StorageError::database(cf))?
                .is_some();
            if present {
                debug!(cf = %cf, staged, "Batch precondition failed");
                return Err(StorageError::Conflict { cf: cf.clone() });
            }
        }
        db.write(writes).map_err(StorageError::database("batch"))?;
        debug!(staged, "Batch committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!(discarded = self.writes.len(), "Batch rolled back");
    }
}
