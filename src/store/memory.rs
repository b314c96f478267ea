use std::collections::HashMap;

use anyhow::Result;
use bytes::Bytes;
use parking_lot::RwLock;

use super::traits::FragmentStore;

/// In-process store. Readers never wait on each other; writers hold the lock
/// only for the map update.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<Vec<u8>, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl FragmentStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        self.map.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }
}
