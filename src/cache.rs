//! Timestamp-based artifact cache.
//!
//! Each entry binds a descriptor's path to a compiled artifact, the set of
//! source paths it was derived from (with their observed modification
//! times) and the list of output paths it generated. Validity is checked
//! lazily at lookup time; there is no eviction.
//!
//! Invalidation is deliberately coarse: every `put` re-stamps all site
//! templates and all global-navigation targets, so a template or shared
//! navigation edit invalidates the whole cache instead of computing precise
//! per-page dependents.

use crate::compiler::Item;
use crate::descriptor::PathDescriptor;
use crate::log;
use crate::site::Site;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

struct CacheEntry {
    artifact: Arc<Item>,
    /// Source path -> last observed modification time. Directories are
    /// tracked for existence only.
    sources: FxHashMap<PathBuf, SystemTime>,
    outputs: Vec<PathBuf>,
}

#[derive(Default)]
pub struct Cache {
    entries: RwLock<FxHashMap<PathBuf, CacheEntry>>,
    hits: AtomicU64,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored artifact, iff the entry exists and is still valid.
    ///
    /// Valid means: every recorded source still exists, regular-file
    /// timestamps are unchanged, and `expected_output` (when given) is
    /// among the recorded outputs. Any I/O error during the check is
    /// treated conservatively as a miss.
    pub fn get(
        &self,
        descriptor: &PathDescriptor,
        expected_output: Option<&Path>,
    ) -> Option<Arc<Item>> {
        let entries = self.entries.read();
        let entry = entries.get(descriptor.path())?;

        if let Some(expected) = expected_output
            && !entry.outputs.iter().any(|o| o == expected)
        {
            return None;
        }

        for (source, stamp) in &entry.sources {
            let metadata = match fs::metadata(source) {
                Ok(metadata) => metadata,
                Err(_) => return None, // vanished or unreadable
            };
            if !metadata.is_file() {
                continue;
            }
            match metadata.modified() {
                Ok(modified) if modified == *stamp => {}
                Ok(_) => return None,
                Err(e) => {
                    log!("cache"; "mtime unavailable for {}: {e}", source.display());
                    return None;
                }
            }
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.artifact.clone())
    }

    /// Store (or refresh) the entry for a descriptor.
    ///
    /// First write creates the entry; later writes replace the artifact and
    /// merge `outputs` into the recorded output list. Every call stamps the
    /// given sources, the descriptor's ancestry chain, all site templates
    /// and all navigation targets at their current modification times.
    pub fn put(
        &self,
        site: &Site,
        descriptor: &PathDescriptor,
        sources: &[PathBuf],
        artifact: Arc<Item>,
        outputs: &[PathBuf],
    ) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(descriptor.path().to_path_buf())
            .or_insert_with(|| CacheEntry {
                artifact: artifact.clone(),
                sources: FxHashMap::default(),
                outputs: Vec::new(),
            });
        entry.artifact = artifact;

        for output in outputs {
            if !entry.outputs.contains(output) {
                entry.outputs.push(output.clone());
            }
        }

        for source in sources {
            stamp(&mut entry.sources, source);
        }
        let mut ancestor = Some(descriptor);
        while let Some(desc) = ancestor {
            stamp(&mut entry.sources, desc.path());
            ancestor = desc.parent().map(Arc::as_ref);
        }
        for template in site.template_files() {
            stamp(&mut entry.sources, &template);
        }
        for target in site.nav_targets() {
            stamp(&mut entry.sources, &target);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn stamp(sources: &mut FxHashMap<PathBuf, SystemTime>, path: &Path) {
    if let Ok(metadata) = fs::metadata(path)
        && let Ok(modified) = metadata.modified()
    {
        sources.insert(path.to_path_buf(), modified);
    }
}

// ============================================================================
// Tests
// ============================================================================
