//! Compiled in-memory representation of one node.

use crate::descriptor::PathDescriptor;
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::path::PathBuf;

/// One compiled node: a leaf's rendered fragment, or a directory's
/// aggregate listing with its child items.
#[derive(Debug, Clone)]
pub struct Item {
    /// Source path of the node
    pub path: PathBuf,
    /// Raw source filename (tie-breaker in ordering)
    pub file_name: String,
    /// Site-relative link target, e.g. `blog/post.html`
    pub url: String,
    pub name: String,
    pub nr: u64,
    /// ISO date when the ordering key came from a date
    pub date: Option<String>,
    /// Rendered body fragment, usable inside listings
    pub html: String,
    /// Directory nesting depth at which this item was produced
    pub depth: usize,
    /// How many promotions this item has passed through
    pub promote_depth: usize,
    pub is_dir: bool,
    /// Sorted child items (directories only)
    pub items: Vec<Item>,
}

impl Item {
    pub fn from_descriptor(descriptor: &PathDescriptor, url: String, html: String) -> Self {
        Self {
            path: descriptor.path().to_path_buf(),
            file_name: descriptor.file_name().to_string(),
            url,
            name: descriptor.name().to_string(),
            nr: descriptor.nr(),
            date: descriptor.date().map(|d| d.format("%Y-%m-%d").to_string()),
            html,
            depth: 0,
            promote_depth: 0,
            is_dir: descriptor.is_dir(),
            items: Vec::new(),
        }
    }

    /// Tag with the position the compiler encountered this item at.
    pub fn tag(mut self, depth: usize, promote_depth: usize) -> Self {
        self.depth = depth;
        self.promote_depth = promote_depth;
        self
    }

    /// Total order: `nr`, then `name`, then raw filename, then full path.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.nr
            .cmp(&other.nr)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.path.cmp(&other.path))
    }

    /// Descending `nr`; equal keys keep the ascending tie-break order.
    pub fn compare_desc(&self, other: &Self) -> Ordering {
        other
            .nr
            .cmp(&self.nr)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.path.cmp(&other.path))
    }

    /// Template-model form of this item.
    pub fn to_model(&self) -> Value {
        json!({
            "url": self.url,
            "name": self.name,
            "nr": self.nr,
            "date": self.date,
            "html": self.html,
            "dir": self.is_dir,
        })
    }

    /// Template model for a directory listing built around this aggregate.
    pub fn listing_model(&self) -> Map<String, Value> {
        let mut model = Map::new();
        model.insert("title".into(), Value::String(self.name.clone()));
        model.insert("url".into(), Value::String(self.url.clone()));
        model.insert(
            "items".into(),
            Value::Array(self.items.iter().map(Item::to_model).collect()),
        );
        model
    }
}

// ============================================================================
// Tests
// ============================================================================
