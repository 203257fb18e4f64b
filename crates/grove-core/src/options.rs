//! Parse options and the optional `grove.toml` config file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::Language;

/// Config file looked up at the repository root.
pub const CONFIG_FILE: &str = "grove.toml";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound for the default subprocess pool size.
pub const MAX_DEFAULT_JOBS: usize = 8;

/// Options shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOptions {
    /// Keep dependency directories (`node_modules`, `vendor`, ...) in the walk.
    pub include_node_modules: bool,
    pub include_tests: bool,
    /// Emit edges for `import type` / `export type ... from`.
    pub include_type_imports: bool,
    /// Directory recursion cap; files directly in the root are depth 1.
    pub max_depth: Option<usize>,
    /// Extra globs matched against repo-relative paths.
    pub exclude_patterns: Vec<String>,

    /// Skip detection and use this backend.
    pub language: Option<Language>,
    /// Concurrent interpreter processes for the subprocess backends.
    pub jobs: Option<usize>,
    /// Per-invocation timeout for the subprocess backends.
    pub timeout_secs: Option<u64>,
    pub php_binary: Option<PathBuf>,
    pub ruby_binary: Option<PathBuf>,
    /// Composer autoloader that provides `nikic/php-parser`.
    pub php_parser_autoload: Option<PathBuf>,
}

impl ParseOptions {
    /// Read `grove.toml` from the repository root, or fall back to defaults.
    pub fn load(repo: &Path) -> Result<Self> {
        let path = repo.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| GraphError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let options: ParseOptions = toml::from_str(&content).map_err(|e| GraphError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!("Loaded options from {}", path.display());
        Ok(options)
    }

    pub fn jobs(&self) -> usize {
        match self.jobs {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get().min(MAX_DEFAULT_JOBS))
                .unwrap_or(2),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }

    pub fn with_tests(mut self, include: bool) -> Self {
        self.include_tests = include;
        self
    }

    pub fn with_type_imports(mut self, include: bool) -> Self {
        self.include_type_imports = include;
        self
    }

    pub fn with_node_modules(mut self, include: bool) -> Self {
        self.include_node_modules = include;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}
