//! Pluggable per-format handlers.
//!
//! Handlers are tried in a fixed registration order; the first whose
//! `can_handle` matches compiles the leaf. The verbatim-copy handler is
//! the universal fallback and must be registered last — that position is
//! asserted at registry construction.

pub mod copy;
pub mod markdown;
pub mod text;

use crate::compiler::{CompileCtx, Item};
use crate::descriptor::PathDescriptor;
use crate::site::Site;
use anyhow::Result;
use std::sync::Arc;

pub use copy::CopyHandler;
pub use markdown::MarkdownHandler;
pub use text::TextHandler;

/// One source-format converter.
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extensions this handler recognizes; feeds descriptor extension
    /// stripping.
    fn extensions(&self) -> &'static [&'static str];

    /// True for the universal fallback handler.
    fn is_catch_all(&self) -> bool {
        false
    }

    fn can_handle(&self, site: &Site, descriptor: &PathDescriptor) -> bool;

    /// Compile one leaf. `None` means the leaf contributes nothing to its
    /// directory's listing.
    fn compile(&self, ctx: &CompileCtx, descriptor: &Arc<PathDescriptor>)
    -> Result<Option<Item>>;
}

pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Build a registry from an ordered handler list.
    ///
    /// # Panics
    /// When the last handler is not the universal fallback.
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        assert!(
            handlers.last().is_some_and(|h| h.is_catch_all()),
            "the catch-all copy handler must be registered last"
        );
        Self { handlers }
    }

    /// The standard handler stack: markdown, text, then verbatim copy.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(MarkdownHandler),
            Box::new(TextHandler),
            Box::new(CopyHandler),
        ])
    }

    /// Union of all handlers' extensions, in registration order.
    pub fn known_extensions(&self) -> Vec<&'static str> {
        self.handlers
            .iter()
            .flat_map(|h| h.extensions().iter().copied())
            .collect()
    }

    /// First handler claiming the descriptor, in registration order.
    pub fn handler_for(&self, site: &Site, descriptor: &PathDescriptor) -> Option<&dyn Handler> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(site, descriptor))
            .map(Box::as_ref)
    }
}

// ============================================================================
// Tests
// ============================================================================
