//! Plain-text and raw HTML leaf handler.
//!
//! Text files render as escaped preformatted blocks; `.htm`/`.html`
//! sources pass through as the page body.

use super::Handler;
use crate::compiler::{CompileCtx, Item};
use crate::descriptor::{PathDescriptor, frontmatter};
use crate::render::TEMPLATE_PAGE;
use crate::site::Site;
use crate::utils;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::sync::Arc;

const EXTENSIONS: &[&str] = &["txt", "htm", "html"];

pub struct TextHandler;

impl Handler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn can_handle(&self, _site: &Site, descriptor: &PathDescriptor) -> bool {
        descriptor
            .extensions()
            .iter()
            .any(|e| EXTENSIONS.contains(&e.as_str()))
    }

    fn compile(
        &self,
        ctx: &CompileCtx,
        descriptor: &Arc<PathDescriptor>,
    ) -> Result<Option<Item>> {
        let out = ctx.output_file(descriptor, "html");
        if let Some(hit) = ctx.cache.get(descriptor, Some(&out)) {
            ctx.record_output(&out);
            return Ok(Some((*hit).clone()));
        }

        let raw = fs::read_to_string(descriptor.path())
            .with_context(|| format!("Failed to read {}", descriptor.path().display()))?;
        let source = frontmatter::strip_frontmatter(&raw);
        let body = if descriptor.extensions().iter().any(|e| e == "txt") {
            format!("<pre>{}</pre>", utils::escape_html(source))
        } else {
            source.to_string()
        };

        let mut model = Map::new();
        model.insert("title".into(), Value::String(descriptor.name().to_string()));
        model.insert("content".into(), Value::String(body.clone()));
        let page = ctx.renderer.render_or_empty(TEMPLATE_PAGE, &model);

        utils::write_if_changed(&out, page.as_bytes())?;
        ctx.record_output(&out);

        let item = Item::from_descriptor(descriptor, ctx.link_for(descriptor, "html"), body);
        ctx.cache.put(
            ctx.site,
            descriptor,
            &[descriptor.path().to_path_buf()],
            Arc::new(item.clone()),
            &[out],
        );
        Ok(Some(item))
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
    use crate::site::Site;
    use tempfile::TempDir;

    #[test]
    fn test_text_rendered_as_escaped_pre() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("site");
        fs::create_dir_all(&source).unwrap();
        let config = SiteConfig {
            source,
            output: dir.path().join("public"),
            ..Default::default()
        };
        let site = Site::new(&config).unwrap();
        let cache = Cache::new();
        let renderer = Renderer::new(config.templates_dir());
        let ctx = CompileCtx::new(&site, &cache, &renderer);

        let path = site.source().join("1-notes.txt");
        fs::write(&path, "a < b").unwrap();
        let desc = site.descriptor(&path).unwrap();

        let item = TextHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(item.html, "<pre>a &lt; b</pre>");
        assert!(dir.path().join("public/notes.html").is_file());
    }

    #[test]
    fn test_html_passes_through() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("site");
        fs::create_dir_all(&source).unwrap();
        let config = SiteConfig {
            source,
            output: dir.path().join("public"),
            ..Default::default()
        };
        let site = Site::new(&config).unwrap();
        let cache = Cache::new();
        let renderer = Renderer::new(config.templates_dir());
        let ctx = CompileCtx::new(&site, &cache, &renderer);

        let path = site.source().join("1-embed.html");
        fs::write(&path, "<section>raw</section>").unwrap();
        let desc = site.descriptor(&path).unwrap();

        let item = TextHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(item.html, "<section>raw</section>");
    }
}
