//! Debounced recursive source-tree watcher.
//!
//! Funnels raw filesystem events through a debounce window, so a burst of
//! rapid mutations (editor save dances, bulk copies) collapses into one
//! rebuild notification.
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Event Loop                     │
//! │                                                 │
//! │  ┌────────┐    ┌───────────┐    ┌────────────┐  │
//! │  │ notify │───▶│ Debouncer │───▶│ on_change  │  │
//! │  │ events │    │ (window)  │    │ (rebuild)  │  │
//! │  └────────┘    └───────────┘    └────────────┘  │
//! └─────────────────────────────────────────────────┘
//! ```

use crate::log;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Idle receive timeout while nothing is pending.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// The stop flag is observed at least this often.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Path utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debounce state
// =============================================================================

/// Batches rapid file events into one notification per quiet window.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    window: Duration,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            window,
        }
    }

    fn add_paths(&mut self, paths: &[PathBuf]) {
        for path in paths {
            if !is_temp_file(path) {
                self.pending.insert(path.clone());
            }
        }
        if !self.pending.is_empty() {
            self.last_event = Some(Instant::now());
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty() && self.last_event.is_some_and(|t| t.elapsed() >= self.window)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            IDLE_TIMEOUT
        } else {
            self.window
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Watch `source` recursively and call `on_change` with each debounced
/// batch of changed paths.
///
/// Blocks until `stop` is set (or the watcher channel closes); returning
/// drops the watcher handle and deregisters the watch.
pub fn watch_blocking(
    source: &Path,
    window: Duration,
    stop: &AtomicBool,
    mut on_change: impl FnMut(&[PathBuf]),
) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(source, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", source.display()))?;
    log!("watch"; "watching {}", source.display());

    let mut debouncer = Debouncer::new(window);

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(debouncer.timeout().min(STOP_POLL_INTERVAL)) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add_paths(&event.paths),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                let changed = debouncer.take();
                on_change(&changed);
            }
            Err(RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeouts with nothing ready
            _ => {}
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/s/draft.md~")));
        assert!(is_temp_file(Path::new("/s/.draft.md.swp")));
        assert!(is_temp_file(Path::new("/s/notes.bak")));
        assert!(!is_temp_file(Path::new("/s/1-post.md")));
    }

    #[test]
    fn test_debouncer_collapses_burst_into_one_batch() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        for i in 0..5 {
            debouncer.add_paths(&[PathBuf::from(format!("/s/{i}.md"))]);
        }
        // Duplicate events fold into the set
        debouncer.add_paths(&[PathBuf::from("/s/0.md")]);
        assert!(!debouncer.ready());

        std::thread::sleep(Duration::from_millis(15));
        assert!(debouncer.ready());
        assert_eq!(debouncer.take().len(), 5);
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_events_separated_by_window_yield_separate_batches() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.add_paths(&[PathBuf::from("/s/a.md")]);
        std::thread::sleep(Duration::from_millis(15));
        assert!(debouncer.ready());
        let first = debouncer.take();
        assert_eq!(first, vec![PathBuf::from("/s/a.md")]);

        // A mutation after the quiet window starts a second cycle
        debouncer.add_paths(&[PathBuf::from("/s/b.md")]);
        assert!(!debouncer.ready());
        std::thread::sleep(Duration::from_millis(15));
        assert!(debouncer.ready());
        assert_eq!(debouncer.take(), vec![PathBuf::from("/s/b.md")]);
    }

    #[test]
    fn test_debouncer_resets_window_on_new_event() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));
        debouncer.add_paths(&[PathBuf::from("/s/a.md")]);
        std::thread::sleep(Duration::from_millis(20));
        debouncer.add_paths(&[PathBuf::from("/s/b.md")]);
        // First event is 20ms old but the window restarted
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_debouncer_ignores_temp_files() {
        let mut debouncer = Debouncer::new(Duration::from_millis(1));
        debouncer.add_paths(&[PathBuf::from("/s/a.md~"), PathBuf::from("/s/.a.swp")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!debouncer.ready());
        assert!(debouncer.last_event.is_none());
    }

    #[test]
    fn test_debouncer_timeout_depends_on_pending() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert_eq!(debouncer.timeout(), IDLE_TIMEOUT);
        debouncer.add_paths(&[PathBuf::from("/s/a.md")]);
        assert_eq!(debouncer.timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_stop_flag_ends_the_loop() {
        use std::sync::Arc;

        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().to_path_buf();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            watch_blocking(&source, Duration::from_millis(10), &flag, |_| {})
        });

        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}
