//! Site configuration management for `xdocc.toml`.
//!
//! # Example
//!
//! ```toml
//! source = "site"
//! output = "public"
//! templates = "site/.templates"
//! debounce_ms = 300
//! ```
//!
//! All paths are resolved relative to the project root. CLI arguments
//! override file values after loading.

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

fn default_source() -> PathBuf {
    PathBuf::from("site")
}

fn default_output() -> PathBuf {
    PathBuf::from("public")
}

const fn default_debounce_ms() -> u64 {
    300
}

/// Root configuration structure representing xdocc.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Source tree whose entry names follow the metadata grammar
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Mirrored output tree of rendered files
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Template directory (default: `.templates` inside the source tree)
    #[serde(default)]
    pub templates: Option<PathBuf>,

    /// Clean output directory before building
    #[serde(default)]
    pub clean: bool,

    /// Debounce window for watch mode, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::from("."),
            source: default_source(),
            output: default_output(),
            templates: None,
            clean: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a toml file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Apply CLI overrides and resolve all paths against the project root.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        self.root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));

        if let Some(source) = &cli.source {
            self.source = source.clone();
        }
        if let Some(output) = &cli.output {
            self.output = output.clone();
        }

        let build_args = cli.build_args();
        if build_args.clean {
            self.clean = true;
        }
        if let Commands::Watch {
            debounce: Some(ms), ..
        } = &cli.command
        {
            self.debounce_ms = *ms;
        }

        self.source = self.root.join(&self.source);
        self.output = self.root.join(&self.output);
        self.templates = Some(match self.templates.take() {
            Some(t) => self.root.join(t),
            None => self.source.join(".templates"),
        });
    }

    /// Template directory, resolved by `update_with_cli`.
    pub fn templates_dir(&self) -> PathBuf {
        self.templates
            .clone()
            .unwrap_or_else(|| self.source.join(".templates"))
    }

    /// Check that the configuration points at a usable source tree.
    pub fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            bail!("Source directory not found: {}", self.source.display());
        }
        if self.source == self.output {
            bail!("Source and output directories must differ");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
