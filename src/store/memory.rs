//! In-process overflow store.
//!
//! Values are kept in their encoded form so this backend round-trips exactly
//! like the SQLite one. Used by tests, benchmarks and `--memory-store`.

use std::collections::HashMap;

use super::stored::StoredAggregate;
use super::OverflowStore;
use crate::error::{RankError, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OverflowStore for MemoryStore {
    fn get(&mut self, domain: &str) -> Result<Option<StoredAggregate>> {
        self.entries
            .get(domain)
            .map(|bytes| StoredAggregate::decode(bytes))
            .transpose()
            .map_err(|e| RankError::StoreRead(format!("{domain}: {e}")))
    }

    fn put(&mut self, domain: &str, value: &StoredAggregate) -> Result<()> {
        let bytes = value.encode().map_err(|e| RankError::StoreWrite {
            domains: 1,
            reason: e.to_string(),
        })?;
        self.entries.insert(domain.to_string(), bytes);
        Ok(())
    }

    fn get_all(&mut self) -> Result<Vec<(String, StoredAggregate)>> {
        self.entries
            .iter()
            .map(|(domain, bytes)| {
                StoredAggregate::decode(bytes)
                    .map(|value| (domain.clone(), value))
                    .map_err(|e| RankError::StoreRead(format!("{domain}: {e}")))
            })
            .collect()
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}
