//! The per-run site context: source/output roots, handler registry and the
//! descriptor memoization table.
//!
//! Descriptors are memoized per `(site, canonical path)` pair for the
//! lifetime of one compile run; a fresh `Site` per run keeps watch-mode
//! rebuilds from seeing stale metadata and keeps tests isolated.

use crate::config::SiteConfig;
use crate::descriptor::PathDescriptor;
use crate::handlers::HandlerRegistry;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Structural failures of site construction and descriptor lookup.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("path {path} is outside the site source root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

pub struct Site {
    source: PathBuf,
    output: PathBuf,
    templates: PathBuf,
    handlers: HandlerRegistry,
    descriptors: RwLock<FxHashMap<PathBuf, Arc<PathDescriptor>>>,
}

impl Site {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Self::with_handlers(config, HandlerRegistry::standard())
    }

    pub fn with_handlers(config: &SiteConfig, handlers: HandlerRegistry) -> Result<Self> {
        let source = config
            .source
            .canonicalize()
            .with_context(|| format!("Source directory not found: {}", config.source.display()))?;
        Ok(Self {
            source,
            output: config.output.clone(),
            templates: config.templates_dir(),
            handlers,
            descriptors: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Descriptor for a path inside the source tree, memoized for this run.
    ///
    /// Fails with [`SiteError::OutsideRoot`] when the path does not live
    /// under the source root.
    pub fn descriptor(&self, path: &Path) -> Result<Arc<PathDescriptor>, SiteError> {
        let path = self.normalize(path);
        if !path.starts_with(&self.source) {
            return Err(SiteError::OutsideRoot {
                path,
                root: self.source.clone(),
            });
        }

        {
            let memo = self.descriptors.read();
            if let Some(descriptor) = memo.get(&path) {
                return Ok(descriptor.clone());
            }
        }

        let descriptor = if path == self.source {
            Arc::new(PathDescriptor::root(path.clone()))
        } else {
            let parent_path = match path.parent() {
                Some(parent) => parent,
                None => {
                    return Err(SiteError::OutsideRoot {
                        path,
                        root: self.source.clone(),
                    });
                }
            };
            let parent = self.descriptor(parent_path)?;
            let known = self.handlers.known_extensions();
            Arc::new(PathDescriptor::new(path.clone(), parent, &known))
        };

        // Two racing parses of the same path are harmless; first insert wins
        Ok(self
            .descriptors
            .write()
            .entry(path)
            .or_insert(descriptor)
            .clone())
    }

    /// Every file under the template directory. Part of the cache's coarse
    /// fan-out set: touching any of them invalidates all entries.
    pub fn template_files(&self) -> Vec<PathBuf> {
        if !self.templates.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&self.templates)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .collect()
    }

    /// Resolved targets of the global navigation: the visible directories
    /// directly under the source root.
    pub fn nav_targets(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.source) else {
            return Vec::new();
        };
        let mut targets: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| self.descriptor(&entry.path()).ok())
            .filter(|d| d.is_dir() && d.is_visible())
            .map(|d| d.path().to_path_buf())
            .collect();
        targets.sort();
        targets
    }

    /// Canonicalize where possible; deleted paths fall back to the raw
    /// absolute form so stale lookups still hit the memo table.
    fn normalize(&self, path: &Path) -> PathBuf {
        path.canonicalize()
            .unwrap_or_else(|_| std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_site(dir: &TempDir) -> Site {
        let source = dir.path().join("site");
        fs::create_dir_all(&source).unwrap();
        let config = SiteConfig {
            source,
            output: dir.path().join("public"),
            ..Default::default()
        };
        Site::new(&config).unwrap()
    }

    #[test]
    fn test_descriptor_outside_root_fails() {
        let dir = TempDir::new().unwrap();
        let site = test_site(&dir);
        let outside = dir.path().join("elsewhere/1-a.md");
        let err = site.descriptor(&outside).unwrap_err();
        assert!(matches!(err, SiteError::OutsideRoot { .. }));
    }

    #[test]
    fn test_descriptor_memoized() {
        let dir = TempDir::new().unwrap();
        let site = test_site(&dir);
        let path = site.source().join("1-a.md");
        fs::write(&path, "hello").unwrap();

        let first = site.descriptor(&path).unwrap();
        let second = site.descriptor(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_root_descriptor_lookup() {
        let dir = TempDir::new().unwrap();
        let site = test_site(&dir);
        let root = site.descriptor(site.source()).unwrap();
        assert!(root.is_root());
        assert!(root.is_visible());
    }

    #[test]
    fn test_nav_targets_visible_dirs_only() {
        let dir = TempDir::new().unwrap();
        let site = test_site(&dir);
        fs::create_dir(site.source().join("1-blog")).unwrap();
        fs::create_dir(site.source().join("2-about")).unwrap();
        fs::create_dir(site.source().join(".templates")).unwrap();
        fs::create_dir(site.source().join("not-numbered")).unwrap();
        fs::write(site.source().join("1-page.md"), "x").unwrap();

        let targets = site.nav_targets();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.is_dir()));
    }

    #[test]
    fn test_template_files() {
        let dir = TempDir::new().unwrap();
        let site = test_site(&dir);
        let templates = site.source().join(".templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(templates.join("index.html"), "{{items}}").unwrap();
        fs::write(templates.join("page.html"), "{{content}}").unwrap();

        assert_eq!(site.template_files().len(), 2);
    }
}
