//! Row storage engine.
//!
//! Each entity type lives in its own sled tree (`rows:<Entity>`), keyed by
//! the encoded identity value and holding rkyv-encoded [`Record`]s.

use crate::config::StorageConfig;
use crate::error::Error;
use crate::record::Record;
use dashmap::DashMap;
use polyglot_proto::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Prefix of per-entity row trees.
const ROWS_TREE_PREFIX: &str = "rows:";

/// Key type tags, so identities of different types never collide.
const KEY_TAG_INT: u8 = 1;
const KEY_TAG_STRING: u8 = 2;
const KEY_TAG_UUID: u8 = 3;

/// The storage engine wrapping sled.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Opened row trees by entity type.
    trees: DashMap<String, Tree>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Ok(Self {
            db,
            trees: DashMap::new(),
        })
    }

    /// Check if the database was recovered from a previous run.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Get the underlying sled database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Store a row, replacing any previous row with the same identity.
    pub fn put(&self, entity_type: &str, id: &Value, record: &Record) -> Result<(), Error> {
        let key = encode_key(entity_type, id)?;
        self.tree(entity_type)?.insert(key, record.to_bytes()?)?;
        debug!(
            entity = entity_type,
            columns = record.columns.len(),
            "Stored row"
        );
        Ok(())
    }

    /// Get a row by identity.
    pub fn get(&self, entity_type: &str, id: &Value) -> Result<Option<Record>, Error> {
        let key = encode_key(entity_type, id)?;
        match self.tree(entity_type)?.get(key)? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a row unless one with the same identity exists.
    ///
    /// Returns `false`, leaving the stored row untouched, on a duplicate.
    pub fn insert_new(&self, entity_type: &str, id: &Value, record: &Record) -> Result<bool, Error> {
        let key = encode_key(entity_type, id)?;
        let bytes = record.to_bytes()?;
        let swapped = self
            .tree(entity_type)?
            .compare_and_swap(key, None::<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    /// Rewrite a stored row in one transaction.
    ///
    /// `f` receives the current record and returns its replacement; it may
    /// run more than once when a concurrent writer touches the same tree.
    /// Returns `None` if the row does not exist.
    pub fn update<F>(&self, entity_type: &str, id: &Value, f: F) -> Result<Option<Record>, Error>
    where
        F: Fn(Record) -> Result<Record, Error>,
    {
        let key = encode_key(entity_type, id)?;
        let result: Result<Option<Record>, TransactionError<Error>> =
            self.tree(entity_type)?.transaction(|tx| {
                let Some(bytes) = tx.get(key.as_slice())? else {
                    return Ok(None);
                };
                let record = Record::from_bytes(&bytes)
                    .and_then(&f)
                    .map_err(ConflictableTransactionError::Abort)?;
                let encoded = record
                    .to_bytes()
                    .map_err(ConflictableTransactionError::Abort)?;
                tx.insert(key.as_slice(), encoded)?;
                Ok(Some(record))
            });

        match result {
            Ok(record) => Ok(record),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }

    /// Scan every row of an entity type, in key order.
    pub fn scan(&self, entity_type: &str) -> Result<Vec<Record>, Error> {
        self.tree(entity_type)?
            .iter()
            .map(|result| {
                let (_, bytes) = result?;
                Record::from_bytes(&bytes)
            })
            .collect()
    }

    /// Number of rows of an entity type.
    pub fn count_rows(&self, entity_type: &str) -> Result<usize, Error> {
        Ok(self.tree(entity_type)?.len())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    /// Next value of a monotonically increasing integer identity.
    pub fn next_sequence(&self) -> Result<i64, Error> {
        Ok(self.db.generate_id()? as i64 + 1)
    }

    /// Generate a new identity (UUID v4 bytes).
    pub fn generate_id() -> [u8; 16] {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&now.to_le_bytes());
        id[8..16].copy_from_slice(&counter.to_le_bytes());

        // UUID version 4 and variant bits
        id[6] = (id[6] & 0x0f) | 0x40;
        id[8] = (id[8] & 0x3f) | 0x80;

        id
    }

    fn tree(&self, entity_type: &str) -> Result<Tree, Error> {
        if let Some(tree) = self.trees.get(entity_type) {
            return Ok(tree.clone());
        }
        let tree = self
            .db
            .open_tree(format!("{ROWS_TREE_PREFIX}{entity_type}"))?;
        self.trees.insert(entity_type.to_string(), tree.clone());
        Ok(tree)
    }
}

/// Encode an identity value as a row key.
fn encode_key(entity_type: &str, id: &Value) -> Result<Vec<u8>, Error> {
    let mut key = Vec::with_capacity(17);
    match id {
        Value::Int32(v) => {
            key.push(KEY_TAG_INT);
            key.extend_from_slice(&order_preserving(i64::from(*v)));
        }
        Value::Int64(v) => {
            key.push(KEY_TAG_INT);
            key.extend_from_slice(&order_preserving(*v));
        }
        Value::String(s) => {
            key.push(KEY_TAG_STRING);
            key.extend_from_slice(s.as_bytes());
        }
        Value::Uuid(bytes) => {
            key.push(KEY_TAG_UUID);
            key.extend_from_slice(bytes);
        }
        _ => {
            return Err(Error::InvalidIdentity {
                entity: entity_type.to_string(),
            })
        }
    }
    Ok(key)
}

/// Big-endian bytes of `v` with the sign bit flipped, so keys sort numerically.
fn order_preserving(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}
