use anyhow::Result;
use bytes::Bytes;

use crate::manifest::FragmentKey;

/// Persistent byte-keyed map.
///
/// Implementations must tolerate concurrent calls from several sessions and
/// from inbound pull requests. Each operation stands alone; there are no
/// cross-key transactions.
pub trait FragmentStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;
    /// Insert or overwrite.
    fn put(&self, key: &[u8], value: Bytes) -> Result<()>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &[u8]) -> Result<()>;
}

/// Fixed-width store key for an integer identifier (8 bytes, little-endian).
pub fn fragment_key_bytes(key: FragmentKey) -> [u8; 8] {
    key.to_le_bytes()
}

/// Integer-keyed convenience layer over [`FragmentStore`].
pub trait FragmentStoreExt {
    fn get_fragment(&self, key: FragmentKey) -> Result<Option<Bytes>>;
    fn put_fragment(&self, key: FragmentKey, value: Bytes) -> Result<()>;
    fn remove_fragment(&self, key: FragmentKey) -> Result<()>;
}

impl<S: FragmentStore + ?Sized> FragmentStoreExt for S {
    fn get_fragment(&self, key: FragmentKey) -> Result<Option<Bytes>> {
        self.get(&fragment_key_bytes(key))
    }

    fn put_fragment(&self, key: FragmentKey, value: Bytes) -> Result<()> {
        self.put(&fragment_key_bytes(key), value)
    }

    fn remove_fragment(&self, key: FragmentKey) -> Result<()> {
        self.remove(&fragment_key_bytes(key))
    }
}
