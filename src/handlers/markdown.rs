//! Markdown leaf handler.

use super::Handler;
use crate::compiler::{CompileCtx, Item};
use crate::descriptor::{PathDescriptor, frontmatter};
use crate::render::TEMPLATE_PAGE;
use crate::site::Site;
use crate::utils;
use anyhow::{Context, Result};
use pulldown_cmark::{Options, Parser, html};
use serde_json::{Map, Value};
use std::fs;
use std::sync::Arc;

const EXTENSIONS: &[&str] = &["md", "markdown"];

pub struct MarkdownHandler;

impl Handler for MarkdownHandler {
    fn name(&self) -> &'static str {
        "markdown"
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
        let body = markdown_to_html(frontmatter::strip_frontmatter(&raw));

        let mut model = Map::new();
        model.insert("title".into(), Value::String(descriptor.name().to_string()));
        model.insert("content".into(), Value::String(body.clone()));
        if let Some(date) = descriptor.date() {
            model.insert(
                "date".into(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        }
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

/// Convert markdown source to an HTML fragment.
pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
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
    use tempfile::TempDir;

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html("# Title\n\nSome *text*.\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn test_markdown_to_html_table() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_compile_writes_page_and_caches() {
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

        let path = site.source().join("1-hello.md");
        fs::write(&path, "---\nname: Hello Page\n---\n# Hi\n").unwrap();
        let desc = site.descriptor(&path).unwrap();

        let item = MarkdownHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(item.name, "Hello Page");
        assert!(item.html.contains("<h1>Hi</h1>"));
        assert_eq!(item.url, "hello.html");

        let out = dir.path().join("public/hello.html");
        assert!(out.is_file());
        let page = fs::read_to_string(&out).unwrap();
        // Frontmatter never leaks into the output
        assert!(!page.contains("name: Hello Page"));
        assert!(page.contains("<h1>Hi</h1>"));

        // Second compile is a cache hit
        MarkdownHandler.compile(&ctx, &desc).unwrap().unwrap();
        assert_eq!(cache.hits(), 1);
    }
}
