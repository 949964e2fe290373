//! Path descriptors: the parsed metadata view of one filesystem path.
//!
//! Entry names in the source tree encode ordering, visibility and metadata:
//!
//! ```text
//! 1-about.md                      nr=1, url="about"
//! 2024-03-01-release.md           nr=epoch millis of the date
//! 3-team:The-Team.md              inline name override
//! 4-gallery[Holiday Pics].md      bracket name override
//! 5-news|hide|sort=asc.md         pipe-delimited flags and properties
//! ```
//!
//! A descriptor is constructed once per `(site, path)` pair and memoized by
//! the owning [`Site`](crate::site::Site) for the duration of one compile
//! run. Grammar mismatches are soft failures: the path is simply not
//! visible.

pub mod frontmatter;

use chrono::{NaiveDate, NaiveDateTime};
use frontmatter::Frontmatter;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `nr == 0` in an entry name means "sort last".
pub const NR_SORT_LAST: u64 = u64::MAX;

/// The site root always sorts first.
pub const NR_ROOT: u64 = 1;

const DATETIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parsed identity of one path inside the site source tree.
#[derive(Debug)]
pub struct PathDescriptor {
    path: PathBuf,
    file_name: String,
    parent: Option<Arc<PathDescriptor>>,
    nr: u64,
    date: Option<NaiveDateTime>,
    url: String,
    name: String,
    properties: FxHashMap<String, Option<String>>,
    extensions: Vec<String>,
    visible: bool,
    is_dir: bool,
}

impl PathDescriptor {
    /// Descriptor for the site source root. Always visible, `nr = 1`,
    /// exempt from the naming grammar.
    pub(crate) fn root(path: PathBuf) -> Self {
        Self {
            path,
            file_name: String::new(),
            parent: None,
            nr: NR_ROOT,
            date: None,
            url: String::new(),
            name: String::new(),
            properties: FxHashMap::default(),
            extensions: Vec::new(),
            visible: true,
            is_dir: true,
        }
    }

    /// Parse a non-root path. `known_extensions` is the union of all
    /// registered handlers' extensions, in registration order.
    pub(crate) fn new(
        path: PathBuf,
        parent: Arc<PathDescriptor>,
        known_extensions: &[&str],
    ) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_dir = path.is_dir();
        let (stem, extensions) = strip_extensions(&file_name, known_extensions);

        // Leading dot or trailing tilde hides the path outright
        let hidden = file_name.starts_with('.') || file_name.ends_with('~');

        let mut descriptor = Self {
            path,
            file_name,
            parent: Some(parent),
            nr: 0,
            date: None,
            url: String::new(),
            name: String::new(),
            properties: FxHashMap::default(),
            extensions,
            visible: false,
            is_dir,
        };

        let grammar_ok = if hidden {
            false
        } else if let Some(parsed) = parse_name(&stem) {
            descriptor.nr = parsed.nr;
            descriptor.date = parsed.date;
            descriptor.url = parsed.url;
            descriptor.name = parsed.name;
            descriptor.properties = parsed.properties;
            true
        } else {
            false
        };

        if !hidden {
            let fm = if is_dir {
                frontmatter::read_control_file(&descriptor.path)
            } else {
                frontmatter::read_file_frontmatter(&descriptor.path)
            };
            if let Frontmatter::Parsed(map) = fm {
                descriptor.apply_frontmatter(map);
            }
        }

        descriptor.visible = !hidden
            && grammar_ok
            && (is_dir || !descriptor.extensions.is_empty())
            && descriptor.resolve_property("hide").is_none();
        descriptor
    }

    /// Frontmatter keys override filename-derived fields and properties.
    fn apply_frontmatter(&mut self, map: FxHashMap<String, Option<String>>) {
        for (key, value) in map {
            match key.as_str() {
                "name" | "n" => {
                    if let Some(v) = value {
                        self.name = v;
                    }
                }
                "url" => {
                    if let Some(v) = value {
                        self.url = v;
                    }
                }
                "nr" => {
                    if let Some(v) = &value {
                        if let Ok(n) = v.parse::<u64>() {
                            self.nr = if n == 0 { NR_SORT_LAST } else { n };
                        } else if let Some((millis, date)) = parse_date_value(v) {
                            self.nr = millis;
                            self.date = Some(date);
                        }
                    }
                }
                "date" => {
                    if let Some(v) = &value
                        && let Some((_, date)) = parse_date_value(v)
                    {
                        self.date = Some(date);
                    }
                }
                _ => {
                    self.properties.insert(key, value);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn parent(&self) -> Option<&Arc<PathDescriptor>> {
        self.parent.as_ref()
    }

    pub fn nr(&self) -> u64 {
        self.nr
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        self.date
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Local property lookup. `Some(None)` is a bare flag.
    pub fn property(&self, key: &str) -> Option<&Option<String>> {
        self.properties.get(key)
    }

    /// Property lookup walking parent descriptors up to the site root.
    pub fn resolve_property(&self, key: &str) -> Option<Option<String>> {
        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.resolve_property(key))
    }

    /// True when the key is set here or on any ancestor.
    pub fn has_flag(&self, key: &str) -> bool {
        self.resolve_property(key).is_some()
    }

    /// True when the key is set on this descriptor itself.
    pub fn has_local_flag(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    // ------------------------------------------------------------------------
    // Navigation helpers
    // ------------------------------------------------------------------------

    /// Site-relative output directory path, built from the url chain.
    pub fn url_path(&self) -> PathBuf {
        match &self.parent {
            Some(parent) => parent.url_path().join(&self.url),
            None => PathBuf::new(),
        }
    }

    /// Site-relative link target with segments joined by `/`.
    pub fn target_url(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(self);
        while let Some(desc) = current {
            if !desc.url.is_empty() {
                segments.push(desc.url.as_str());
            }
            current = desc.parent.as_deref();
        }
        segments.reverse();
        segments.join("/")
    }

    /// Original file name reconstructed from url and stripped extensions,
    /// used when mirroring a file verbatim into the output tree.
    pub fn output_file_name(&self) -> String {
        let mut name = self.url.clone();
        for ext in self.extensions.iter().rev() {
            name.push('.');
            name.push_str(ext);
        }
        name
    }

    /// Total order: `nr`, then `name`, then raw filename, then full path.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.nr
            .cmp(&other.nr)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialEq for PathDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PathDescriptor {}

// ============================================================================
// Name grammar
// ============================================================================

#[derive(Debug)]
struct ParsedName {
    nr: u64,
    date: Option<NaiveDateTime>,
    url: String,
    name: String,
    properties: FxHashMap<String, Option<String>>,
}

/// Parse an extension-stripped entry name.
///
/// Returns `None` on any grammar mismatch (the path is then not visible).
fn parse_name(stem: &str) -> Option<ParsedName> {
    let head_end = stem.find(['|', '[']).unwrap_or(stem.len());
    let head = &stem[..head_end];

    let (nr, date, token_len) = parse_order_token(head)?;
    // A literal '-' must follow the ordering token
    let url_part = head[token_len..].strip_prefix('-')?;

    // ':' inside the url splits off an inline name override
    let (url, mut name) = match url_part.split_once(':') {
        Some((url, name)) => (url.to_string(), name.to_string()),
        None => (url_part.to_string(), url_part.to_string()),
    };

    let mut properties = FxHashMap::default();
    let rest = &stem[head_end..];

    // A matching [...] span overrides the name
    let without_bracket = match rest.find('[') {
        Some(open) => match rest[open..].find(']') {
            Some(close_rel) => {
                name = rest[open + 1..open + close_rel].to_string();
                format!("{}{}", &rest[..open], &rest[open + close_rel + 1..])
            }
            None => return None, // unmatched bracket
        },
        None => rest.to_string(),
    };

    // Everything from the first '|' onward: key or key=value tokens
    if let Some(pipe) = without_bracket.find('|') {
        for token in without_bracket[pipe + 1..].split('|') {
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some(("name" | "n", value)) => name = value.to_string(),
                Some((key, value)) => {
                    // "file"-ish keys carry paths; '>' stands in for '/'
                    let value = if key.to_ascii_lowercase().contains("file") {
                        value.replace('>', "/")
                    } else {
                        value.to_string()
                    };
                    properties.insert(key.to_string(), Some(value));
                }
                None => {
                    properties.insert(token.to_string(), None);
                }
            }
        }
    }

    Some(ParsedName {
        nr,
        date,
        url,
        name,
        properties,
    })
}

/// Match the mandatory ordering prefix, in priority order: full datetime,
/// date, leading integer. Returns `(nr, date, consumed bytes)`.
fn parse_order_token(head: &str) -> Option<(u64, Option<NaiveDateTime>, usize)> {
    if let Some(prefix) = head.get(..19)
        && let Ok(datetime) = NaiveDateTime::parse_from_str(prefix, DATETIME_FORMAT)
    {
        return Some((epoch_millis(datetime), Some(datetime), 19));
    }
    if let Some(prefix) = head.get(..10)
        && let Ok(date) = NaiveDate::parse_from_str(prefix, DATE_FORMAT)
    {
        let datetime = date.and_hms_opt(0, 0, 0)?;
        return Some((epoch_millis(datetime), Some(datetime), 10));
    }
    let digits = head.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let nr: u64 = head[..digits].parse().ok()?;
    let nr = if nr == 0 { NR_SORT_LAST } else { nr };
    Some((nr, None, digits))
}

/// Parse a frontmatter date value with the same two patterns as the grammar.
fn parse_date_value(value: &str) -> Option<(u64, NaiveDateTime)> {
    let datetime = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some((epoch_millis(datetime), datetime))
}

fn epoch_millis(datetime: NaiveDateTime) -> u64 {
    datetime.and_utc().timestamp_millis().max(0) as u64
}

/// Repeatedly strip recognized extension suffixes, restarting the scan
/// after every match so stacked extensions are all recognized.
///
/// Extensions are recorded in strip order (outermost first).
fn strip_extensions(file_name: &str, known: &[&str]) -> (String, Vec<String>) {
    let mut rest = file_name.to_string();
    let mut extensions = Vec::new();
    'scan: loop {
        for ext in known {
            let suffix_len = ext.len() + 1;
            if rest.len() > suffix_len
                && rest.ends_with(ext)
                && rest.as_bytes()[rest.len() - suffix_len] == b'.'
            {
                rest.truncate(rest.len() - suffix_len);
                extensions.push((*ext).to_string());
                continue 'scan;
            }
        }
        break;
    }
    (rest, extensions)
}

// ============================================================================
// Tests
// ============================================================================
