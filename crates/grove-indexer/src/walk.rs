//! Source file discovery using the `ignore` crate.
//!
//! Each ecosystem has a [`SourceProfile`] describing which extensions are
//! sources, which directories hold third-party dependencies and how test
//! files are named. Results are sorted so every run sees files in the same
//! order.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use globset::{Glob, GlobSet, GlobSetBuilder};
use grove_core::{GraphError, ParseOptions, Result};
use ignore::WalkBuilder;
use regex::Regex;

use crate::paths::relative_path;

/// VCS metadata and build output, never walked.
pub const ALWAYS_SKIPPED_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", "dist", "build", "coverage", ".next", ".nuxt", ".turbo", ".cache", "tmp",
];

/// Dependency directories of every ecosystem (used by the detector census).
pub const ALL_DEPENDENCY_DIRS: &[&str] = &["node_modules", "bower_components", "vendor", ".bundle"];

static NODE_TESTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|/)(__tests__|__mocks__|tests?|e2e)/|\.(test|spec)\.[cm]?[jt]sx?$")
        .expect("valid test pattern")
});

static PHP_TESTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|/)tests?/|Test\.php$").expect("valid test pattern"));

static RUBY_TESTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|/)(spec|test)/|_(spec|test)\.rb$").expect("valid test pattern")
});

/// Per-ecosystem traversal rules.
pub struct SourceProfile {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub dependency_dirs: &'static [&'static str],
    test_pattern: &'static LazyLock<Regex>,
}

impl SourceProfile {
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }

    pub fn is_test_file(&self, relative: &str) -> bool {
        self.test_pattern.is_match(relative)
    }
}

pub static NODE_PROFILE: SourceProfile = SourceProfile {
    name: "node",
    extensions: &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"],
    dependency_dirs: &["node_modules", "bower_components"],
    test_pattern: &NODE_TESTS,
};

pub static PHP_PROFILE: SourceProfile = SourceProfile {
    name: "php",
    extensions: &["php"],
    dependency_dirs: &["vendor"],
    test_pattern: &PHP_TESTS,
};

pub static RUBY_PROFILE: SourceProfile = SourceProfile {
    name: "ruby",
    extensions: &["rb"],
    dependency_dirs: &["vendor", ".bundle"],
    test_pattern: &RUBY_TESTS,
};

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Repo-relative, `/`-separated; doubles as the file node id.
    pub relative: String,
    pub absolute: PathBuf,
}

pub fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| GraphError::InvalidOptions(format!("exclude pattern `{pattern}`: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GraphError::InvalidOptions(e.to_string()))
}

/// Walk `root` and return the source files the options select, sorted by path.
pub fn discover(root: &Path, options: &ParseOptions, profile: &SourceProfile) -> Result<Vec<SourceFile>> {
    let excludes = build_excludes(&options.exclude_patterns)?;
    let keep_dependencies = options.include_node_modules;

    let mut skipped_dirs: Vec<&'static str> = ALWAYS_SKIPPED_DIRS.to_vec();
    if !keep_dependencies {
        skipped_dirs.extend_from_slice(profile.dependency_dirs);
    }

    let filter_root = root.to_path_buf();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .parents(false)
        .git_global(false)
        .git_ignore(!keep_dependencies)
        .git_exclude(!keep_dependencies)
        .follow_links(false)
        .max_depth(options.max_depth)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if is_dir {
                let name = entry.file_name().to_string_lossy();
                if skipped_dirs.iter().any(|d| *d == name) {
                    return false;
                }
            }
            match relative_path(&filter_root, entry.path()) {
                Some(relative) => !excludes.is_match(&relative),
                None => true,
            }
        });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Walk error under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !profile.matches_extension(path) {
            continue;
        }
        let Some(relative) = relative_path(root, path) else {
            continue;
        };
        if !options.include_tests && profile.is_test_file(&relative) {
            continue;
        }
        files.push(SourceFile {
            relative,
            absolute: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    tracing::debug!("Discovered {} {} source files", files.len(), profile.name);
    Ok(files)
}
