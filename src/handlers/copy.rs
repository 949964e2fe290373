//! Verbatim-copy fallback handler.
//!
//! Claims every leaf no earlier handler wants and mirrors it into the
//! output tree under its cleaned name, keeping the original extensions.
//! Timestamps stand in for a cache entry: the copy is skipped when the
//! destination is at least as new as the source.

use super::Handler;
use crate::compiler::{CompileCtx, Item};
use crate::descriptor::PathDescriptor;
use crate::log;
use crate::site::Site;
use crate::utils;
use anyhow::Result;
use std::sync::Arc;

const EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "css", "js", "pdf", "zip", "tar", "gz", "ico", "woff2",
];

pub struct CopyHandler;

impl Handler for CopyHandler {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn is_catch_all(&self) -> bool {
        true
    }

    fn can_handle(&self, _site: &Site, _descriptor: &PathDescriptor) -> bool {
        true
    }

    fn compile(
        &self,
        ctx: &CompileCtx,
        descriptor: &Arc<PathDescriptor>,
    ) -> Result<Option<Item>> {
        let parent = descriptor
            .parent()
            .map(|p| p.url_path())
            .unwrap_or_default();
        let out = ctx
            .site
            .output()
            .join(parent)
            .join(descriptor.output_file_name());

        if utils::copy_if_newer(descriptor.path(), &out)? {
            log!("copy"; "{} -> {}", descriptor.path().display(), out.display());
        }
        ctx.record_output(&out);

        let url = {
            let mut base = descriptor.target_url();
            for ext in descriptor.extensions().iter().rev() {
                base.push('.');
                base.push_str(ext);
            }
            base
        };
        Ok(Some(Item::from_descriptor(descriptor, url, String::new())))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::SiteConfig;
    use crate::render::Renderer;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> (Site, Cache, Renderer) {
        let source = dir.path().join("site");
        fs::create_dir_all(&source).unwrap();
        let config = SiteConfig {
            source,
            output: dir.path().join("public"),
            ..Default::default()
        };
        (
            Site::new(&config).unwrap(),
            Cache::new(),
            Renderer::new(config.templates_dir()),
        )
    }

    #[test]
    fn test_copies_with_cleaned_name_and_extensions() {
        let dir = TempDir::new().unwrap();
        let (site, cache, renderer) = fixture(&dir);
        let ctx = CompileCtx::new(&site, &cache, &renderer);

        let src = site.source().join("3-logo.png");
        fs::write(&src, [1u8, 2, 3]).unwrap();
        let desc = site.descriptor(&src).unwrap();

        let item = CopyHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(item.url, "logo.png");

        let out = dir.path().join("public/logo.png");
        assert_eq!(fs::read(&out).unwrap(), [1u8, 2, 3]);
    }

    #[test]
    fn test_second_compile_skips_copy() {
        let dir = TempDir::new().unwrap();
        let (site, cache, renderer) = fixture(&dir);
        let ctx = CompileCtx::new(&site, &cache, &renderer);

        let src = site.source().join("1-data.zip");
        fs::write(&src, b"zzz").unwrap();
        let desc = site.descriptor(&src).unwrap();

        CopyHandler.compile(&ctx, &desc).unwrap();
        let out = dir.path().join("public/data.zip");
        let mtime = out.metadata().unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        CopyHandler.compile(&ctx, &desc).unwrap();
        assert_eq!(out.metadata().unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn test_multiple_extensions_survive() {
        let dir = TempDir::new().unwrap();
        let (site, cache, renderer) = fixture(&dir);
        let ctx = CompileCtx::new(&site, &cache, &renderer);

        let src = site.source().join("1-dump.tar.gz");
        fs::write(&src, b"x").unwrap();
        let desc = site.descriptor(&src).unwrap();

        let item = CopyHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(item.url, "dump.tar.gz");
        assert!(dir.path().join("public/dump.tar.gz").is_file());
    }
}
