// Static content description: files split into segments, segments into fragments.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::MAX_PULL_FRAME_BYTES;
use crate::error::{EngineError, EngineResult};

pub type FileKey = i64;
pub type SegmentKey = i64;
pub type FragmentKey = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub key: FileKey,
    /// Destination relative to the session's base path.
    pub local_path: String,
    /// Origin URI used for ranged fetches.
    pub remote_path: String,
    pub file_size: u64,
    /// Segments in byte order.
    pub segment_keys: Vec<SegmentKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub key: SegmentKey,
    pub file_key: FileKey,
    pub offset_in_file: u64,
    /// Fragments in byte order.
    pub fragment_keys: Vec<FragmentKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentEntry {
    pub key: FragmentKey,
    pub segment_key: SegmentKey,
}

/// Wire/disk form of a manifest, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestData {
    segment_size: u64,
    fragment_size: u64,
    files: Vec<FileEntry>,
    segments: Vec<SegmentEntry>,
    fragments: Vec<FragmentEntry>,
}

/// Immutable, validated manifest shared by a session and its collaborators.
///
/// Maps are ordered so that iteration (and therefore seeded sampling) is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ManifestData", into = "ManifestData")]
pub struct Manifest {
    segment_size: u64,
    fragment_size: u64,
    file_map: BTreeMap<FileKey, FileEntry>,
    segment_map: BTreeMap<SegmentKey, SegmentEntry>,
    fragment_map: BTreeMap<FragmentKey, FragmentEntry>,
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidManifest(msg.into())
}

fn check_sizes(segment_size: u64, fragment_size: u64) -> EngineResult<()> {
    if segment_size == 0 {
        return Err(invalid("segment_size must be > 0"));
    }
    if fragment_size == 0 {
        return Err(invalid("fragment_size must be > 0"));
    }
    if fragment_size > segment_size {
        return Err(invalid(format!(
            "segment_size {} must not be smaller than fragment_size {}",
            segment_size, fragment_size
        )));
    }
    // Peers exchange one fragment per pull frame.
    if fragment_size > MAX_PULL_FRAME_BYTES as u64 {
        return Err(invalid(format!(
            "fragment_size {} exceeds the pull frame limit {}",
            fragment_size, MAX_PULL_FRAME_BYTES
        )));
    }
    if segment_size % fragment_size != 0 {
        return Err(invalid(format!(
            "fragment_size {} must divide segment_size {}",
            fragment_size, segment_size
        )));
    }
    Ok(())
}

fn check_local_path(file: &FileEntry) -> EngineResult<()> {
    let path = Path::new(&file.local_path);
    if file.local_path.is_empty() || path.is_absolute() {
        return Err(invalid(format!(
            "file {} local_path {:?} must be a non-empty relative path",
            file.key, file.local_path
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid(format!(
            "file {} local_path {:?} must not contain '..'",
            file.key, file.local_path
        )));
    }
    Ok(())
}

fn index_unique<K: Ord + Copy + std::fmt::Display, V>(
    kind: &str,
    entries: Vec<V>,
    key_of: impl Fn(&V) -> K,
) -> EngineResult<BTreeMap<K, V>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let key = key_of(&entry);
        if map.insert(key, entry).is_some() {
            return Err(invalid(format!("duplicate {} key {}", kind, key)));
        }
    }
    Ok(map)
}

impl Manifest {
    /// Build and validate a manifest. All structural invariants are checked here
    /// so that a session never observes an inconsistent manifest.
    pub fn new(
        segment_size: u64,
        fragment_size: u64,
        files: Vec<FileEntry>,
        segments: Vec<SegmentEntry>,
        fragments: Vec<FragmentEntry>,
    ) -> EngineResult<Self> {
        check_sizes(segment_size, fragment_size)?;

        let file_map = index_unique("file", files, |f| f.key)?;
        let segment_map = index_unique("segment", segments, |s| s.key)?;
        let fragment_map = index_unique("fragment", fragments, |f| f.key)?;

        let manifest = Self {
            segment_size,
            fragment_size,
            file_map,
            segment_map,
            fragment_map,
        };
        manifest.check_hierarchy()?;
        Ok(manifest)
    }

    fn check_hierarchy(&self) -> EngineResult<()> {
        let mut owned_segments = BTreeSet::new();
        for file in self.file_map.values() {
            check_local_path(file)?;

            let expected_segments = file.file_size.div_ceil(self.segment_size);
            if file.segment_keys.len() as u64 != expected_segments {
                return Err(invalid(format!(
                    "file {} of {} bytes lists {} segments, expected {}",
                    file.key,
                    file.file_size,
                    file.segment_keys.len(),
                    expected_segments
                )));
            }

            for (index, segment_key) in file.segment_keys.iter().enumerate() {
                let segment = self.segment_map.get(segment_key).ok_or_else(|| {
                    invalid(format!("file {} refers to unknown segment {}", file.key, segment_key))
                })?;
                if segment.file_key != file.key {
                    return Err(invalid(format!(
                        "segment {} is listed by file {} but owned by file {}",
                        segment.key, file.key, segment.file_key
                    )));
                }
                if !owned_segments.insert(*segment_key) {
                    return Err(invalid(format!("segment {} listed twice", segment_key)));
                }
                let expected_offset = index as u64 * self.segment_size;
                if segment.offset_in_file != expected_offset {
                    return Err(invalid(format!(
                        "segment {} offset {} does not match position {} (expected {})",
                        segment.key, segment.offset_in_file, index, expected_offset
                    )));
                }
            }
        }
        if owned_segments.len() != self.segment_map.len() {
            return Err(invalid("some segments are not listed by any file"));
        }

        let mut owned_fragments = BTreeSet::new();
        for segment in self.segment_map.values() {
            let expected_fragments = self.segment_len(segment).div_ceil(self.fragment_size);
            if segment.fragment_keys.len() as u64 != expected_fragments {
                return Err(invalid(format!(
                    "segment {} lists {} fragments, expected {}",
                    segment.key,
                    segment.fragment_keys.len(),
                    expected_fragments
                )));
            }
            for fragment_key in &segment.fragment_keys {
                let fragment = self.fragment_map.get(fragment_key).ok_or_else(|| {
                    invalid(format!(
                        "segment {} refers to unknown fragment {}",
                        segment.key, fragment_key
                    ))
                })?;
                if fragment.segment_key != segment.key {
                    return Err(invalid(format!(
                        "fragment {} is listed by segment {} but owned by segment {}",
                        fragment.key, segment.key, fragment.segment_key
                    )));
                }
                if !owned_fragments.insert(*fragment_key) {
                    return Err(invalid(format!("fragment {} listed twice", fragment_key)));
                }
            }
        }
        if owned_fragments.len() != self.fragment_map.len() {
            return Err(invalid("some fragments are not listed by any segment"));
        }

        Ok(())
    }

    /// Parse and validate a JSON manifest.
    pub fn from_json_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read a JSON manifest from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    pub fn to_json_vec(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn fragment_size(&self) -> u64 {
        self.fragment_size
    }

    /// Number of fragments in a full-length segment.
    pub fn fragments_per_segment(&self) -> u64 {
        self.segment_size / self.fragment_size
    }

    pub fn file(&self, key: FileKey) -> Option<&FileEntry> {
        self.file_map.get(&key)
    }

    pub fn segment(&self, key: SegmentKey) -> Option<&SegmentEntry> {
        self.segment_map.get(&key)
    }

    pub fn fragment(&self, key: FragmentKey) -> Option<&FragmentEntry> {
        self.fragment_map.get(&key)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.file_map.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentEntry> {
        self.segment_map.values()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &FragmentEntry> {
        self.fragment_map.values()
    }

    pub fn file_keys(&self) -> impl Iterator<Item = FileKey> + '_ {
        self.file_map.keys().copied()
    }

    pub fn fragment_keys(&self) -> impl Iterator<Item = FragmentKey> + '_ {
        self.fragment_map.keys().copied()
    }

    /// Byte length of a segment. The final segment of a file may be shorter
    /// than `segment_size`.
    pub fn segment_len(&self, segment: &SegmentEntry) -> u64 {
        let file_size = self
            .file_map
            .get(&segment.file_key)
            .map(|f| f.file_size)
            .unwrap_or(0);
        self.segment_size
            .min(file_size.saturating_sub(segment.offset_in_file))
    }

    /// Fragment keys of a file, in byte order.
    pub fn file_fragment_keys<'a>(
        &'a self,
        file: &'a FileEntry,
    ) -> impl Iterator<Item = FragmentKey> + 'a {
        file.segment_keys
            .iter()
            .filter_map(|sk| self.segment_map.get(sk))
            .flat_map(|s| s.fragment_keys.iter().copied())
    }
}

impl TryFrom<ManifestData> for Manifest {
    type Error = EngineError;

    fn try_from(data: ManifestData) -> EngineResult<Self> {
        Manifest::new(
            data.segment_size,
            data.fragment_size,
            data.files,
            data.segments,
            data.fragments,
        )
    }
}

impl From<Manifest> for ManifestData {
    fn from(m: Manifest) -> Self {
        Self {
            segment_size: m.segment_size,
            fragment_size: m.fragment_size,
            files: m.file_map.into_values().collect(),
            segments: m.segment_map.into_values().collect(),
            fragments: m.fragment_map.into_values().collect(),
        }
    }
}

/// Assigns sequential keys to files, segments and fragments.
pub struct ManifestBuilder {
    segment_size: u64,
    fragment_size: u64,
    files: Vec<FileEntry>,
    segments: Vec<SegmentEntry>,
    fragments: Vec<FragmentEntry>,
}

impl ManifestBuilder {
    pub fn new(segment_size: u64, fragment_size: u64) -> Self {
        Self {
            segment_size,
            fragment_size,
            files: Vec::new(),
            segments: Vec::new(),
            fragments: Vec::new(),
        }
    }

    /// Describe one file. Segment and fragment keys continue from the previous
    /// file's keys.
    pub fn add_file(
        mut self,
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let file_key = self.files.len() as FileKey;
        let mut segment_keys = Vec::new();

        // A zero-sized step would never terminate; `build` reports the bad sizes.
        if self.segment_size > 0 && self.fragment_size > 0 {
            let mut offset = 0u64;
            while offset < file_size {
                let segment_key = self.segments.len() as SegmentKey;
                let segment_len = self.segment_size.min(file_size - offset);
                let fragment_count = segment_len.div_ceil(self.fragment_size);

                let mut fragment_keys = Vec::with_capacity(fragment_count as usize);
                for _ in 0..fragment_count {
                    let fragment_key = self.fragments.len() as FragmentKey;
                    self.fragments.push(FragmentEntry {
                        key: fragment_key,
                        segment_key,
                    });
                    fragment_keys.push(fragment_key);
                }

                self.segments.push(SegmentEntry {
                    key: segment_key,
                    file_key,
                    offset_in_file: offset,
                    fragment_keys,
                });
                segment_keys.push(segment_key);
                offset += self.segment_size;
            }
        }

        self.files.push(FileEntry {
            key: file_key,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            file_size,
            segment_keys,
        });
        self
    }

    pub fn build(self) -> EngineResult<Manifest> {
        Manifest::new(
            self.segment_size,
            self.fragment_size,
            self.files,
            self.segments,
            self.fragments,
        )
    }
}

/// Split `data` into consecutive `fragment_size` pieces; the last piece may be
/// shorter. Pieces share the input buffer.
pub fn split_fragments(data: &Bytes, fragment_size: usize) -> Vec<Bytes> {
    if fragment_size == 0 {
        return Vec::new();
    }
    (0..data.len())
        .step_by(fragment_size)
        .map(|start| data.slice(start..(start + fragment_size).min(data.len())))
        .collect()
}
