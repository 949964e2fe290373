//! Small filesystem helpers shared by the compiler and handlers.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Write `contents` to `path` only if the on-disk bytes differ.
///
/// Creates parent directories on demand. Returns `true` if the file was
/// written. Skipping identical writes keeps output timestamps stable, so
/// recompiling an untouched tree leaves the output tree untouched too.
pub fn write_if_changed(path: &Path, contents: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path)
        && existing == contents
    {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Copy `src` to `dst` unless `dst` exists and is at least as new.
///
/// Returns `true` if the file was copied.
pub fn copy_if_newer(src: &Path, dst: &Path) -> Result<bool> {
    let src_time = src
        .metadata()
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", src.display()))?;

    if let Ok(dst_meta) = dst.metadata()
        && let Ok(dst_time) = dst_meta.modified()
        && src_time <= dst_time
    {
        return Ok(false);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dst.display()))?;
    Ok(true)
}

/// Escape the HTML-significant characters of plain text.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
