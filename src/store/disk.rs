// On-disk fragment store: one file per key under a directory.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;

use super::traits::FragmentStore;

/// Temp-file sequence shared by every store in the process, so instances
/// opened on the same directory never pick the same temp path.
static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create store dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &[u8]) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(anyhow!("empty store key"));
        }
        let mut name = String::with_capacity(key.len() * 2 + 4);
        for b in key {
            let _ = write!(name, "{:02x}", b);
        }
        name.push_str(".frag");
        Ok(self.dir.join(name))
    }
}

impl FragmentStore for DiskStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("read {}: {}", path.display(), e)),
        }
    }

    fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        let path = self.path_for(key)?;

        // Write-then-rename so concurrent readers see either the old value or
        // the complete new one.
        let seq = NEXT_TMP.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            file.write_all(&value)
                .with_context(|| format!("write {}", tmp.display()))?;
            file.sync_data()
                .with_context(|| format!("sync {}", tmp.display()))?;
        }
        fs::rename(&tmp, &path).with_context(|| {
            let _ = fs::remove_file(&tmp);
            format!("rename {} -> {}", tmp.display(), path.display())
        })?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("remove {}: {}", path.display(), e)),
        }
    }
}
