//! The recursive, concurrent compile scheduler.
//!
//! Each directory is one task on the shared rayon pool. A directory lists
//! its non-hidden children, runs file leaves through the handler registry,
//! recurses into subdirectories in parallel, then aggregates: promoted
//! children have their item lists spliced into the parent's listing, while
//! ordinary children contribute exactly one synthesized directory item.
//!
//! ```text
//! compile_tree(root)
//!     │
//!     ├── files ──► HandlerRegistry ──► Item (depth, promote_depth)
//!     │
//!     └── dirs  ──► compile_dir ∥ ──► Contribution::{Promoted, Ordinary}
//!                        │
//!                        └── join children ► sort ► index.html ► aggregate
//! ```

pub mod item;

pub use item::Item;

use crate::cache::Cache;
use crate::deps::DependencyGraph;
use crate::descriptor::PathDescriptor;
use crate::render::{Renderer, TEMPLATE_INDEX};
use crate::site::Site;
use crate::utils;
use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `nr` values below this are manual sequence numbers (sorted ascending);
/// at or above, they are taken for timestamps and sorted newest first.
const AUTO_SORT_TIMESTAMP_MIN: u64 = 1000;

// ============================================================================
// Compile context
// ============================================================================

/// Shared state of one compile run, visible to the scheduler and handlers.
pub struct CompileCtx<'a> {
    pub site: &'a Site,
    pub cache: &'a Cache,
    pub renderer: &'a Renderer,
    /// Dependency edges recorded while the tree compiles
    pub deps: RwLock<DependencyGraph>,
    /// Reference count per generated output path
    outputs: Mutex<FxHashMap<PathBuf, usize>>,
}

impl<'a> CompileCtx<'a> {
    pub fn new(site: &'a Site, cache: &'a Cache, renderer: &'a Renderer) -> Self {
        Self {
            site,
            cache,
            renderer,
            deps: RwLock::new(DependencyGraph::new()),
            outputs: Mutex::new(FxHashMap::default()),
        }
    }

    /// Count a reference to a generated output path.
    pub fn record_output(&self, path: &Path) {
        *self.outputs.lock().entry(path.to_path_buf()).or_insert(0) += 1;
    }

    /// Snapshot of the per-path output reference counts.
    pub fn output_counts(&self) -> FxHashMap<PathBuf, usize> {
        self.outputs.lock().clone()
    }

    /// Mirrored output directory of a directory descriptor.
    pub fn output_dir(&self, descriptor: &PathDescriptor) -> PathBuf {
        self.site.output().join(descriptor.url_path())
    }

    /// Mirrored output path of a file descriptor, with a new extension.
    pub fn output_file(&self, descriptor: &PathDescriptor, ext: &str) -> PathBuf {
        let parent = descriptor
            .parent()
            .map(|p| p.url_path())
            .unwrap_or_default();
        self.site
            .output()
            .join(parent)
            .join(format!("{}.{ext}", descriptor.url()))
    }

    /// Site-relative link target of a file, with a new extension.
    pub fn link_for(&self, descriptor: &PathDescriptor, ext: &str) -> String {
        let mut url = descriptor.target_url();
        url.push('.');
        url.push_str(ext);
        url
    }
}

// ============================================================================
// Scheduling
// ============================================================================

/// How a subdirectory's result enters its parent's listing.
enum Contribution {
    /// Item list spliced directly into the parent
    Promoted(Vec<Item>),
    /// One synthesized directory item
    Ordinary(Item),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortDirection {
    Ascending,
    Descending,
}

/// Compile the whole source tree, returning the root aggregate.
pub fn compile_tree(ctx: &CompileCtx) -> Result<Item> {
    let root = ctx.site.descriptor(ctx.site.source())?;
    compile_dir(ctx, &root, 0, 0)
}

/// Compile one directory subtree.
///
/// Child directories run as parallel tasks; this task suspends until all
/// of them complete. A failed child aborts this subtree after every
/// sibling has run to completion, so one bad branch leaves the rest of the
/// output tree intact.
fn compile_dir(
    ctx: &CompileCtx,
    descriptor: &Arc<PathDescriptor>,
    depth: usize,
    promote_depth: usize,
) -> Result<Item> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let entries = fs::read_dir(descriptor.path())
        .with_context(|| format!("Failed to list {}", descriptor.path().display()))?;
    for entry in entries {
        let entry = entry?;
        let child = ctx.site.descriptor(&entry.path())?;
        if !child.is_visible() {
            continue;
        }
        if child.is_dir() {
            dirs.push(child);
        } else {
            files.push(child);
        }
    }

    // File leaves run inside this directory's task; subtrees in parallel
    let (file_result, dir_results): (Result<Vec<Item>>, Vec<Result<Contribution>>) = rayon::join(
        || compile_files(ctx, descriptor, &files, depth, promote_depth),
        || {
            dirs.par_iter()
                .map(|dir| {
                    ctx.deps.write().add_dependency(dir.path(), descriptor.path());
                    if dir.has_local_flag("promote") {
                        compile_dir(ctx, dir, depth + 1, promote_depth + 1)
                            .map(|aggregate| Contribution::Promoted(aggregate.items))
                    } else {
                        compile_dir(ctx, dir, depth + 1, 0).map(Contribution::Ordinary)
                    }
                })
                .collect()
        },
    );

    let mut items = file_result?;
    let mut failure: Option<anyhow::Error> = None;
    for result in dir_results {
        match result {
            Ok(Contribution::Promoted(promoted)) => items.extend(promoted),
            Ok(Contribution::Ordinary(item)) => items.push(item),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    if let Some(e) = failure {
        // Aggregation never runs for a failed branch
        return Err(e.context(format!("in {}", descriptor.path().display())));
    }

    match sort_direction(descriptor, &items) {
        SortDirection::Ascending => items.sort_by(Item::compare),
        SortDirection::Descending => items.sort_by(Item::compare_desc),
    }

    let mut aggregate = Item::from_descriptor(
        descriptor,
        dir_index_url(descriptor),
        String::new(),
    )
    .tag(depth, promote_depth);
    aggregate.items = items;

    if !descriptor.has_local_flag("noindex") {
        let out = ctx.output_dir(descriptor).join("index.html");
        let html = ctx
            .renderer
            .render_or_empty(TEMPLATE_INDEX, &aggregate.listing_model());
        utils::write_if_changed(&out, html.as_bytes())?;
        ctx.record_output(&out);
    }

    Ok(aggregate)
}

fn compile_files(
    ctx: &CompileCtx,
    dir: &Arc<PathDescriptor>,
    files: &[Arc<PathDescriptor>],
    depth: usize,
    promote_depth: usize,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for file in files {
        let Some(handler) = ctx.site.handlers().handler_for(ctx.site, file) else {
            continue;
        };
        if let Some(item) = handler
            .compile(ctx, file)
            .with_context(|| format!("{} failed on {}", handler.name(), file.path().display()))?
        {
            ctx.deps.write().add_dependency(file.path(), dir.path());
            items.push(item.tag(depth, promote_depth));
        }
    }
    Ok(items)
}

/// Listing link of a directory: its mirrored `index.html`.
fn dir_index_url(descriptor: &PathDescriptor) -> String {
    let base = descriptor.target_url();
    if base.is_empty() {
        "index.html".to_string()
    } else {
        format!("{base}/index.html")
    }
}

/// Explicit `asc`/`desc` flag wins; otherwise ascending iff every item's
/// `nr` looks like a small manual sequence number.
fn sort_direction(descriptor: &PathDescriptor, items: &[Item]) -> SortDirection {
    if descriptor.has_flag("asc") {
        return SortDirection::Ascending;
    }
    if descriptor.has_flag("desc") {
        return SortDirection::Descending;
    }
    if items.iter().all(|i| i.nr < AUTO_SORT_TIMESTAMP_MIN) {
        SortDirection::Ascending
    } else {
        SortDirection::Descending
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        site: Site,
        cache: Cache,
        renderer: Renderer,
        output: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let source = dir.path().join("site");
            fs::create_dir_all(&source).unwrap();
            let output = dir.path().join("public");
            let config = SiteConfig {
                source,
                output: output.clone(),
                ..Default::default()
            };
            let site = Site::new(&config).unwrap();
            let renderer = Renderer::new(config.templates_dir());
            Self {
                _dir: dir,
                site,
                cache: Cache::new(),
                renderer,
                output,
            }
        }

        fn source(&self) -> &Path {
            self.site.source()
        }

        fn compile(&self) -> Result<Item> {
            let ctx = CompileCtx::new(&self.site, &self.cache, &self.renderer);
            compile_tree(&ctx)
        }
    }

    fn test_item(nr: u64) -> Item {
        Item {
            path: PathBuf::from(format!("/{nr}")),
            file_name: format!("{nr}"),
            url: String::new(),
            name: String::new(),
            nr,
            date: None,
            html: String::new(),
            depth: 0,
            promote_depth: 0,
            is_dir: false,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_auto_sort_small_numbers_ascending() {
        let fx = Fixture::new();
        for nr in [3u64, 500, 20] {
            fs::write(fx.source().join(format!("{nr}-p{nr}.md")), "x").unwrap();
        }
        let root = fx.compile().unwrap();
        let nrs: Vec<u64> = root.items.iter().map(|i| i.nr).collect();
        assert_eq!(nrs, vec![3, 20, 500]);
    }

    #[test]
    fn test_auto_sort_timestamps_descending() {
        let items = vec![test_item(3), test_item(1_623_456_789_000), test_item(20)];
        let root = Arc::new(crate::descriptor::PathDescriptor::root(PathBuf::from("/s")));
        assert_eq!(sort_direction(&root, &items), SortDirection::Descending);

        let mut sorted = items;
        sorted.sort_by(Item::compare_desc);
        let nrs: Vec<u64> = sorted.iter().map(|i| i.nr).collect();
        assert_eq!(nrs, vec![1_623_456_789_000, 20, 3]);
    }

    #[test]
    fn test_explicit_sort_flag_wins() {
        let fx = Fixture::new();
        let dir = fx.source().join("1-posts|desc");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("1-a.md"), "x").unwrap();
        fs::write(dir.join("2-b.md"), "x").unwrap();

        let root = fx.compile().unwrap();
        let posts = &root.items[0];
        let nrs: Vec<u64> = posts.items.iter().map(|i| i.nr).collect();
        assert_eq!(nrs, vec![2, 1]);
    }

    #[test]
    fn test_desc_ties_keep_name_order() {
        let fx = Fixture::new();
        let dir = fx.source().join("1-posts|desc");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("1-alpha.md"), "x").unwrap();
        fs::write(dir.join("1-beta.md"), "x").unwrap();
        fs::write(dir.join("2-gamma.md"), "x").unwrap();

        let root = fx.compile().unwrap();
        let names: Vec<&str> = root.items[0].items.iter().map(|i| i.name.as_str()).collect();
        // nr descends; the nr=1 pair stays in ascending name order
        assert_eq!(names, vec!["gamma", "alpha", "beta"]);
    }

    #[test]
    fn test_promoted_child_splices_items() {
        let fx = Fixture::new();
        let promoted = fx.source().join("1-news|promote");
        fs::create_dir(&promoted).unwrap();
        fs::write(promoted.join("1-a.md"), "x").unwrap();
        fs::write(promoted.join("2-b.md"), "x").unwrap();

        let ordinary = fx.source().join("2-blog");
        fs::create_dir(&ordinary).unwrap();
        fs::write(ordinary.join("1-c.md"), "x").unwrap();
        fs::write(ordinary.join("2-d.md"), "x").unwrap();

        let root = fx.compile().unwrap();
        // 2 promoted items + 1 ordinary directory item
        assert_eq!(root.items.len(), 3);
        let promoted_items: Vec<&Item> =
            root.items.iter().filter(|i| i.promote_depth == 1).collect();
        assert_eq!(promoted_items.len(), 2);
        assert!(promoted_items.iter().all(|i| i.depth == 1));
        let dirs: Vec<&Item> = root.items.iter().filter(|i| i.is_dir).collect();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].items.len(), 2);
    }

    #[test]
    fn test_directory_index_written_and_mirrored() {
        let fx = Fixture::new();
        let blog = fx.source().join("1-blog");
        fs::create_dir(&blog).unwrap();
        fs::write(blog.join("1-hello.md"), "# Hi\n").unwrap();

        fx.compile().unwrap();

        assert!(fx.output.join("index.html").is_file());
        assert!(fx.output.join("blog/index.html").is_file());
        assert!(fx.output.join("blog/hello.html").is_file());
        let index = fs::read_to_string(fx.output.join("blog/index.html")).unwrap();
        assert!(index.contains("hello.html"));
    }

    #[test]
    fn test_noindex_suppresses_listing() {
        let fx = Fixture::new();
        let dir = fx.source().join("1-raw|noindex");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("1-a.md"), "x").unwrap();

        fx.compile().unwrap();
        assert!(!fx.output.join("raw/index.html").exists());
        // Leaf output still produced
        assert!(fx.output.join("raw/a.html").is_file());
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let fx = Fixture::new();
        fs::write(fx.source().join(".hidden.md"), "x").unwrap();
        fs::write(fx.source().join("1-a.md~"), "x").unwrap();
        fs::write(fx.source().join("unnumbered.md"), "x").unwrap();
        fs::write(fx.source().join("1-ok.md"), "x").unwrap();

        let root = fx.compile().unwrap();
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].name, "ok");
    }

    #[test]
    fn test_failed_subtree_leaves_siblings_intact() {
        let fx = Fixture::new();
        let good = fx.source().join("1-good");
        fs::create_dir(&good).unwrap();
        fs::write(good.join("1-a.md"), "x").unwrap();

        let bad = fx.source().join("2-bad");
        fs::create_dir(&bad).unwrap();
        fs::write(bad.join("1-b.md"), "x").unwrap();
        // Unreadable directory: listing it fails on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&bad, fs::Permissions::from_mode(0o000)).unwrap();
        }

        #[cfg(unix)]
        {
            let result = fx.compile();
            assert!(result.is_err());
            // Sibling subtree still produced its outputs
            assert!(fx.output.join("good/a.html").is_file());
            // Failed branch's aggregation never ran
            assert!(!fx.output.join("bad/index.html").exists());
            // Restore permissions so TempDir can clean up
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&bad, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_recompile_is_idempotent() {
        let fx = Fixture::new();
        let blog = fx.source().join("1-blog");
        fs::create_dir(&blog).unwrap();
        fs::write(blog.join("1-hello.md"), "# Hi\n").unwrap();

        fx.compile().unwrap();
        let page = fx.output.join("blog/hello.html");
        let index = fx.output.join("blog/index.html");
        let page_mtime = page.metadata().unwrap().modified().unwrap();
        let index_mtime = index.metadata().unwrap().modified().unwrap();
        let page_bytes = fs::read(&page).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        fx.compile().unwrap();

        assert_eq!(fs::read(&page).unwrap(), page_bytes);
        assert_eq!(page.metadata().unwrap().modified().unwrap(), page_mtime);
        assert_eq!(index.metadata().unwrap().modified().unwrap(), index_mtime);
    }

    #[test]
    fn test_cache_hit_on_second_compile() {
        let fx = Fixture::new();
        fs::write(fx.source().join("1-a.md"), "hello").unwrap();

        fx.compile().unwrap();
        assert_eq!(fx.cache.hits(), 0);
        fx.compile().unwrap();
        assert!(fx.cache.hits() > 0);
    }

    #[test]
    fn test_dependency_graph_records_structure() {
        let fx = Fixture::new();
        let blog = fx.source().join("1-blog");
        fs::create_dir(&blog).unwrap();
        fs::write(blog.join("1-hello.md"), "x").unwrap();

        let ctx = CompileCtx::new(&fx.site, &fx.cache, &fx.renderer);
        compile_tree(&ctx).unwrap();

        let deps = ctx.deps.read();
        let file = fx.site.descriptor(&blog.join("1-hello.md")).unwrap();
        let closure = deps.find_dependencies(file.path());
        // The file is transitively tied to its directory and the root
        assert!(closure.contains(&fx.site.descriptor(&blog).unwrap().path().to_path_buf()));
        assert!(closure.contains(&fx.site.source().to_path_buf()));
    }

    #[test]
    fn test_output_counter_tracks_generated_paths() {
        let fx = Fixture::new();
        fs::write(fx.source().join("1-a.md"), "x").unwrap();

        let ctx = CompileCtx::new(&fx.site, &fx.cache, &fx.renderer);
        compile_tree(&ctx).unwrap();

        let counts = ctx.output_counts();
        assert!(counts.keys().any(|p| p.ends_with("a.html")));
        assert!(counts.keys().any(|p| p.ends_with("index.html")));
        assert!(counts.values().all(|&c| c == 1));
    }
}
