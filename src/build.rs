//! One full build run over the source tree.
//!
//! The cache and renderer live in [`BuildState`] and survive across watch
//! rebuilds; the [`Site`] and its descriptor table are created fresh for
//! every run so renamed or edited entries never show stale metadata.

use crate::cache::Cache;
use crate::compiler::{self, CompileCtx, Item};
use crate::config::SiteConfig;
use crate::log;
use crate::render::Renderer;
use crate::site::Site;
use anyhow::{Context, Result};
use std::fs;
use std::time::Instant;

/// State that outlives a single build run.
pub struct BuildState {
    pub cache: Cache,
    pub renderer: Renderer,
}

impl BuildState {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            cache: Cache::new(),
            renderer: Renderer::new(config.templates_dir()),
        }
    }
}

/// Compile the whole source tree into the output tree.
///
/// Returns the root aggregate item. A failed subtree fails the run, but
/// only after every sibling subtree has written its outputs.
pub fn build_site(config: &SiteConfig, state: &BuildState, clean: bool) -> Result<Item> {
    config.validate()?;
    let started = Instant::now();

    if clean && config.output.exists() {
        fs::remove_dir_all(&config.output)
            .with_context(|| format!("Failed to clean {}", config.output.display()))?;
        log!("build"; "cleaned {}", config.output.display());
    }
    fs::create_dir_all(&config.output)
        .with_context(|| format!("Failed to create {}", config.output.display()))?;

    let site = Site::new(config)?;
    let ctx = CompileCtx::new(&site, &state.cache, &state.renderer);
    let root = compiler::compile_tree(&ctx)?;

    log!("build"; "{} outputs in {:.2?} ({} cache hits)",
         ctx.output_counts().len(),
         started.elapsed(),
         state.cache.hits());
    Ok(root)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> SiteConfig {
        let source = dir.path().join("site");
        fs::create_dir_all(&source).unwrap();
        SiteConfig {
            source,
            output: dir.path().join("public"),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_produces_mirrored_tree() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let blog = config.source.join("1-blog");
        fs::create_dir(&blog).unwrap();
        fs::write(blog.join("1-hello.md"), "# Hi\n").unwrap();

        let state = BuildState::new(&config);
        let root = build_site(&config, &state, false).unwrap();

        assert_eq!(root.items.len(), 1);
        assert!(config.output.join("index.html").is_file());
        assert!(config.output.join("blog/hello.html").is_file());
    }

    #[test]
    fn test_build_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig {
            source: dir.path().join("nope"),
            output: dir.path().join("public"),
            ..Default::default()
        };
        let state = BuildState::new(&config);
        assert!(build_site(&config, &state, false).is_err());
    }

    #[test]
    fn test_clean_removes_stale_outputs() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        fs::write(config.source.join("1-a.md"), "x").unwrap();

        fs::create_dir_all(&config.output).unwrap();
        let stale = config.output.join("stale.html");
        fs::write(&stale, "old").unwrap();

        let state = BuildState::new(&config);
        build_site(&config, &state, true).unwrap();

        assert!(!stale.exists());
        assert!(config.output.join("a.html").is_file());
    }

    #[test]
    fn test_state_cache_survives_across_runs() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        fs::write(config.source.join("1-a.md"), "x").unwrap();

        let state = BuildState::new(&config);
        build_site(&config, &state, false).unwrap();
        assert_eq!(state.cache.hits(), 0);
        build_site(&config, &state, false).unwrap();
        assert!(state.cache.hits() > 0);
    }

    #[test]
    fn test_rename_seen_by_next_run() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let old = config.source.join("1-draft.md");
        fs::write(&old, "x").unwrap();

        let state = BuildState::new(&config);
        build_site(&config, &state, false).unwrap();
        assert!(config.output.join("draft.html").is_file());

        fs::rename(&old, config.source.join("1-final.md")).unwrap();
        let root = build_site(&config, &state, false).unwrap();
        let urls: Vec<&str> = root.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["final.html"]);
        assert!(config.output.join("final.html").is_file());
    }
}
