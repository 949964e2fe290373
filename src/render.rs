//! Mutex-guarded template rendering.
//!
//! Templates live in the site's `.templates` directory as plain HTML files
//! with `{{key}}` placeholders; built-in shells are used when a template
//! file is absent. The substitution engine itself is trivial, but the
//! `render(template, model) -> String` capability is serialized behind one
//! global mutex: the rendering backend is replaceable, and the contract
//! assumes it is not thread-safe.

use crate::log;
use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

/// Template used for per-directory listing pages.
pub const TEMPLATE_INDEX: &str = "index";
/// Template used for single content pages.
pub const TEMPLATE_PAGE: &str = "page";

/// Model dumps in error logs are cut at this many bytes.
const MODEL_DUMP_LIMIT: usize = 160;

const BUILTIN_PAGE: &str = "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>{{title}}</title></head>\n<body>\n<h1>{{title}}</h1>\n{{content}}\n</body></html>\n";

const BUILTIN_INDEX: &str = "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>{{title}}</title></head>\n<body>\n<h1>{{title}}</h1>\n{{items}}\n</body></html>\n";

pub struct Renderer {
    dir: PathBuf,
    /// Serializes all render calls process-wide.
    lock: Mutex<()>,
}

impl Renderer {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    /// Render a named template against a model.
    pub fn render(&self, template: &str, model: &Map<String, Value>) -> Result<String> {
        let _guard = self.lock.lock();
        let source = self.template_source(template)?;
        Ok(substitute(&source, model))
    }

    /// Render, absorbing failures at the boundary: errors are logged with a
    /// truncated model dump and yield an empty string.
    pub fn render_or_empty(&self, template: &str, model: &Map<String, Value>) -> String {
        match self.render(template, model) {
            Ok(html) => html,
            Err(e) => {
                log!("render"; "{template} failed: {e:#}; model: {}", truncated_dump(model));
                String::new()
            }
        }
    }

    fn template_source(&self, template: &str) -> Result<String> {
        let path = self.dir.join(format!("{template}.html"));
        if path.is_file() {
            return fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()));
        }
        match template {
            TEMPLATE_PAGE => Ok(BUILTIN_PAGE.to_string()),
            TEMPLATE_INDEX => Ok(BUILTIN_INDEX.to_string()),
            other => bail!("unknown template: {other}"),
        }
    }
}

/// Replace `{{key}}` placeholders with model values. Unknown keys render
/// as empty text.
fn substitute(source: &str, model: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                if let Some(value) = model.get(key) {
                    out.push_str(&value_to_html(value));
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// HTML form of a model value. Strings pass through verbatim; arrays of
/// `{url, name}` objects become a linked listing.
fn value_to_html(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let mut out = String::from("<ul class=\"listing\">\n");
            for item in items {
                match (item.get("url"), item.get("name")) {
                    (Some(Value::String(url)), Some(Value::String(name))) => {
                        out.push_str(&format!("<li><a href=\"/{url}\">{name}</a></li>\n"));
                    }
                    _ => out.push_str(&format!("<li>{item}</li>\n")),
                }
            }
            out.push_str("</ul>\n");
            out
        }
        other => other.to_string(),
    }
}

fn truncated_dump(model: &Map<String, Value>) -> String {
    let mut dump = serde_json::to_string(model).unwrap_or_else(|_| "<unserializable>".into());
    if dump.len() > MODEL_DUMP_LIMIT {
        let mut end = MODEL_DUMP_LIMIT;
        while end > 0 && !dump.is_char_boundary(end) {
            end -= 1;
        }
        dump.truncate(end);
        dump.push('…');
    }
    dump
}

// ============================================================================
// Tests
// ============================================================================
