//! Frontmatter and control-file parsing.
//!
//! Regular files may carry a YAML block delimited by lines of three or more
//! dashes; directories may carry a `.xdocc` control file, parsed as YAML
//! first and as `key=value` properties when YAML parsing fails. Parsing
//! never errors across this boundary: the outcome is a tagged
//! [`Frontmatter`] value.

use rustc_hash::FxHashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Directory control file name.
pub const CONTROL_FILE: &str = ".xdocc";

/// Frontmatter read at most this many bytes from the head of a file.
const HEAD_LIMIT: u64 = 64 * 1024;

/// Outcome of a frontmatter parse attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Frontmatter {
    /// A (possibly empty) property map was recovered.
    Parsed(FxHashMap<String, Option<String>>),
    /// Content was present but undecodable in every supported syntax.
    Failed,
}

impl Frontmatter {
    /// The recovered map, empty on failure.
    pub fn into_map(self) -> FxHashMap<String, Option<String>> {
        match self {
            Self::Parsed(map) => map,
            Self::Failed => FxHashMap::default(),
        }
    }
}

/// Read the YAML frontmatter block of a regular file.
///
/// I/O errors and absent blocks both yield an empty `Parsed` map; a present
/// but malformed block yields `Failed`.
pub fn read_file_frontmatter(path: &Path) -> Frontmatter {
    let Ok(file) = fs::File::open(path) else {
        return Frontmatter::Parsed(FxHashMap::default());
    };
    let mut head = String::new();
    if BufReader::new(file.take(HEAD_LIMIT))
        .read_to_string(&mut head)
        .is_err()
    {
        // Binary content: no frontmatter
        return Frontmatter::Parsed(FxHashMap::default());
    }
    match extract_block(&head) {
        Some(block) => match parse_yaml(block) {
            Some(map) => Frontmatter::Parsed(map),
            None => Frontmatter::Failed,
        },
        None => Frontmatter::Parsed(FxHashMap::default()),
    }
}

/// Read a directory's `.xdocc` control file.
///
/// Tries YAML first, then `key=value` properties syntax.
pub fn read_control_file(dir: &Path) -> Frontmatter {
    let path = dir.join(CONTROL_FILE);
    let Ok(raw) = fs::read_to_string(&path) else {
        return Frontmatter::Parsed(FxHashMap::default());
    };
    match parse_yaml(&raw) {
        Some(map) => Frontmatter::Parsed(map),
        None => Frontmatter::Parsed(parse_properties(&raw)),
    }
}

/// Return the body of `text` with any leading frontmatter block removed.
pub fn strip_frontmatter(text: &str) -> &str {
    match find_block(text) {
        Some(block) => &text[block.body_start..],
        None => text,
    }
}

// ============================================================================
// Internal
// ============================================================================

/// A located frontmatter block: the YAML text and the body offset.
struct Block<'a> {
    yaml: &'a str,
    body_start: usize,
}

/// Locate a frontmatter block at the head of `text`.
///
/// The first line must be a delimiter; the block ends at the next
/// delimiter line. An unclosed block is treated as absent.
fn find_block(text: &str) -> Option<Block<'_>> {
    let first_end = text.find('\n')?;
    if !is_delimiter(&text[..first_end]) {
        return None;
    }
    let yaml_start = first_end + 1;
    let mut offset = yaml_start;
    while offset <= text.len() {
        let line_end = text[offset..]
            .find('\n')
            .map_or(text.len(), |i| offset + i);
        if is_delimiter(&text[offset..line_end]) {
            let body_start = if line_end < text.len() {
                line_end + 1
            } else {
                line_end
            };
            return Some(Block {
                yaml: &text[yaml_start..offset],
                body_start,
            });
        }
        offset = line_end + 1;
    }
    None
}

/// A delimiter line is three or more dashes and nothing else.
fn is_delimiter(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3 && line.bytes().all(|b| b == b'-')
}

/// The YAML text between the delimiter lines, if a complete block exists.
fn extract_block(text: &str) -> Option<&str> {
    find_block(text).map(|block| block.yaml)
}

/// Parse YAML into a flat string property map.
///
/// Scalar values are stringified; explicit nulls become flag-style `None`
/// values. Anything that is not a mapping at the top level is a failure.
fn parse_yaml(raw: &str) -> Option<FxHashMap<String, Option<String>>> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(raw).ok()?;
    let mapping = value.as_mapping()?;
    let mut map = FxHashMap::default();
    for (key, value) in mapping {
        let key = scalar_to_string(key)?;
        map.insert(key, yaml_value_to_prop(value));
    }
    Some(map)
}

fn scalar_to_string(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_value_to_prop(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::Null => None,
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        // Nested structures are kept as their YAML source form
        other => serde_yaml_ng::to_string(other)
            .ok()
            .map(|s| s.trim_end().to_string()),
    }
}

/// Properties-file fallback: one `key=value` or bare `key` per line.
fn parse_properties(raw: &str) -> FxHashMap<String, Option<String>> {
    let mut map = FxHashMap::default();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                map.insert(key.trim().to_string(), Some(value.trim().to_string()));
            }
            None => {
                map.insert(line.to_string(), None);
            }
        }
    }
    map
}

// ============================================================================
// Tests
// ============================================================================
