//! Pluggable record store.
//!
//! Every component writes its records through the same `put/get/list`
//! contract under its own key prefix (`key:`, `user:`, `session:`,
//! `audit:`). Values are bincode-encoded. The default `MemoryStore` keeps
//! everything in process; durable backends plug in behind the trait.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{SecurityError, Result};

/// A flat key/value store.
pub trait Store: Send + Sync {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// All values whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-process store. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> SecurityError {
    SecurityError::Store("store lock poisoned".to_string())
}

impl Store for MemoryStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Encodes and writes a record.
pub fn put_record<T: Serialize>(store: &dyn Store, key: &str, record: &T) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .map_err(|e| SecurityError::Store(format!("encode {}: {}", key, e)))?;
    store.put(key, bytes)
}

/// Reads and decodes a record.
pub fn get_record<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => {
            let (record, _) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|e| SecurityError::Store(format!("decode {}: {}", key, e)))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Reads and decodes every record under `prefix`.
pub fn list_records<T: DeserializeOwned>(store: &dyn Store, prefix: &str) -> Result<Vec<T>> {
    store
        .list(prefix)?
        .iter()
        .map(|bytes| {
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map(|(record, _)| record)
                .map_err(|e| SecurityError::Store(format!("decode {}*: {}", prefix, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    #[test]
    fn test_put_get_list() {
        let store = MemoryStore::new();
        put_record(&store, "a:1", &Record { name: "one".into(), count: 1 }).unwrap();
        put_record(&store, "a:2", &Record { name: "two".into(), count: 2 }).unwrap();
        put_record(&store, "b:1", &Record { name: "other".into(), count: 3 }).unwrap();

        let got: Option<Record> = get_record(&store, "a:2").unwrap();
        assert_eq!(got.unwrap().name, "two");

        let listed: Vec<Record> = list_records(&store, "a:").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].count, 1);

        store.delete("a:1").unwrap();
        assert!(get_record::<Record>(&store, "a:1").unwrap().is_none());
        assert_eq!(store.list("").unwrap().len(), 2);
    }
}
