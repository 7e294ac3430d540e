//! Record type for stored rows.

use crate::error::Error;
use polyglot_proto::Value;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored row with metadata.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Column values, sorted by column name.
    pub columns: Vec<(String, Value)>,

    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,

    /// Last update timestamp in microseconds since Unix epoch.
    pub updated_at: u64,
}

impl Record {
    /// Create a new record with the current timestamp.
    pub fn new(columns: BTreeMap<String, Value>) -> Self {
        let now = current_timestamp();
        Self {
            columns: columns.into_iter().collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge column values into this record.
    pub fn merge(&mut self, patch: BTreeMap<String, Value>) {
        let mut columns = self.to_columns();
        columns.extend(patch);
        self.columns = columns.into_iter().collect();
        self.updated_at = current_timestamp();
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Column values as a map.
    pub fn to_columns(&self) -> BTreeMap<String, Value> {
        self.columns.iter().cloned().collect()
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Current time in microseconds since Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_record_bytes_keep_nulls() {
        let record = Record::new(columns(&[
            ("name", Value::from("Laptop")),
            ("name_es", Value::Null),
        ]));
        let bytes = record.to_bytes().unwrap();
        let decoded = Record::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.get("name_es"), Some(&Value::Null));
    }

    #[test]
    fn test_merge_overwrites_only_patched_columns() {
        let mut record = Record::new(columns(&[
            ("name", Value::from("Laptop")),
            ("name_es", Value::from("Portátil")),
        ]));
        record.merge(columns(&[("name_es", Value::from("Portátil nuevo"))]));

        assert_eq!(record.get("name"), Some(&Value::from("Laptop")));
        assert_eq!(record.get("name_es"), Some(&Value::from("Portátil nuevo")));
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(matches!(
            Record::from_bytes(&[1, 2, 3]),
            Err(Error::Deserialization(_))
        ));
    }
}
