// Session completion state: which segments, fragments and files are still outstanding.

use std::collections::BTreeSet;

use crate::manifest::{FileEntry, FileKey, FragmentKey, Manifest, SegmentEntry, SegmentKey};

/// Derived from the manifest at session start and owned by that session alone.
///
/// `known_segments` only grows; `unknown_fragments` and `unknown_files` only
/// shrink.
#[derive(Debug, Clone)]
pub(crate) struct CompletionState {
    known_segments: BTreeSet<SegmentKey>,
    unknown_fragments: BTreeSet<FragmentKey>,
    unknown_files: BTreeSet<FileKey>,
}

impl CompletionState {
    pub fn new(manifest: &Manifest) -> Self {
        Self {
            known_segments: BTreeSet::new(),
            unknown_fragments: manifest.fragment_keys().collect(),
            unknown_files: manifest.file_keys().collect(),
        }
    }

    /// Snapshot of segments not yet known, in key order.
    pub fn unknown_segments<'m>(&self, manifest: &'m Manifest) -> Vec<&'m SegmentEntry> {
        manifest
            .segments()
            .filter(|s| !self.known_segments.contains(&s.key))
            .collect()
    }

    /// Snapshot of fragment keys not yet stored by this session.
    pub fn unknown_fragments(&self) -> Vec<FragmentKey> {
        self.unknown_fragments.iter().copied().collect()
    }

    pub fn mark_fragment_known(&mut self, key: FragmentKey) -> bool {
        self.unknown_fragments.remove(&key)
    }

    pub fn mark_segment_known(&mut self, key: SegmentKey) -> bool {
        self.known_segments.insert(key)
    }

    pub fn mark_file_done(&mut self, key: FileKey) -> bool {
        self.unknown_files.remove(&key)
    }

    pub fn is_segment_known_from_fragments(&self, segment: &SegmentEntry) -> bool {
        !segment
            .fragment_keys
            .iter()
            .any(|k| self.unknown_fragments.contains(k))
    }

    pub fn is_file_known_from_segments(&self, file: &FileEntry) -> bool {
        file.segment_keys
            .iter()
            .all(|k| self.known_segments.contains(k))
    }

    pub fn is_file_pending(&self, key: FileKey) -> bool {
        self.unknown_files.contains(&key)
    }

    pub fn is_complete(&self) -> bool {
        self.unknown_files.is_empty()
    }

    pub fn known_segment_count(&self) -> usize {
        self.known_segments.len()
    }

    pub fn unknown_fragment_count(&self) -> usize {
        self.unknown_fragments.len()
    }

    pub fn unknown_file_count(&self) -> usize {
        self.unknown_files.len()
    }
}
