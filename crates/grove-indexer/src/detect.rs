//! Language detection for a repository root
//!
//! Project markers at the root decide first. Without a marker, a bounded
//! breadth-first census of file extensions picks the dominant ecosystem.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use grove_core::{GraphError, Language, Result};

use crate::walk::{ALL_DEPENDENCY_DIRS, ALWAYS_SKIPPED_DIRS};

/// Directory levels the census descends below the root.
pub const DEFAULT_CENSUS_DEPTH: usize = 4;

const TYPESCRIPT_MARKERS: &[&str] = &["tsconfig.json"];
const PHP_MARKERS: &[&str] = &["composer.json", "artisan", "wp-config.php", "symfony.lock"];
const RUBY_MARKERS: &[&str] = &["Gemfile", "Gemfile.lock", "config.ru", "config/application.rb"];
const JAVASCRIPT_MARKERS: &[&str] = &["package.json"];

/// File counts per ecosystem gathered by the census.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionCensus {
    pub typescript: usize,
    pub javascript: usize,
    pub php: usize,
    pub ruby: usize,
}

impl ExtensionCensus {
    fn record(&mut self, path: &Path) {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return;
        };
        match ext {
            "ts" | "tsx" | "mts" | "cts" => self.typescript += 1,
            "js" | "jsx" | "mjs" | "cjs" => self.javascript += 1,
            "php" => self.php += 1,
            "rb" => self.ruby += 1,
            _ => {}
        }
    }

    /// Staged comparison; ties go to the earlier language in
    /// TypeScript > JavaScript > PHP > Ruby.
    pub fn dominant(&self) -> Option<Language> {
        let ExtensionCensus {
            typescript: ts,
            javascript: js,
            php,
            ruby: rb,
        } = *self;

        if ts > 0 && ts >= php && ts >= rb {
            Some(Language::TypeScript)
        } else if js > 0 && js >= php && js >= rb {
            Some(Language::JavaScript)
        } else if php > 0 && php >= rb {
            Some(Language::Php)
        } else if rb > 0 {
            Some(Language::Ruby)
        } else {
            None
        }
    }
}

/// Detect the language of the repository at `repo`.
///
/// Only fails when the root itself cannot be inspected; a repository without
/// any signal defaults to TypeScript.
pub fn detect_language(repo: &Path) -> Result<Language> {
    let metadata = std::fs::metadata(repo)
        .map_err(|e| GraphError::malformed(repo, format!("cannot read root: {e}")))?;
    if !metadata.is_dir() {
        return Err(GraphError::malformed(repo, "not a directory"));
    }
    std::fs::read_dir(repo)
        .map_err(|e| GraphError::malformed(repo, format!("cannot list root: {e}")))?;

    if let Some(language) = detect_by_marker(repo) {
        tracing::debug!("Detected {} from project marker", language);
        return Ok(language);
    }

    let census = census(repo, DEFAULT_CENSUS_DEPTH);
    let language = census.dominant().unwrap_or(Language::TypeScript);
    tracing::debug!("Detected {} from census {:?}", language, census);
    Ok(language)
}

fn has_any(repo: &Path, markers: &[&str]) -> bool {
    markers.iter().any(|m| repo.join(m).is_file())
}

fn has_gemspec(repo: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(repo) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.path().extension().is_some_and(|e| e == "gemspec")
            && entry.file_type().is_ok_and(|t| t.is_file())
    })
}

fn detect_by_marker(repo: &Path) -> Option<Language> {
    if has_any(repo, TYPESCRIPT_MARKERS) {
        Some(Language::TypeScript)
    } else if has_any(repo, PHP_MARKERS) {
        Some(Language::Php)
    } else if has_any(repo, RUBY_MARKERS) || has_gemspec(repo) {
        Some(Language::Ruby)
    } else if has_any(repo, JAVASCRIPT_MARKERS) {
        Some(Language::JavaScript)
    } else {
        None
    }
}

fn is_skipped_dir(name: &str) -> bool {
    ALWAYS_SKIPPED_DIRS.contains(&name) || ALL_DEPENDENCY_DIRS.contains(&name)
}

/// Breadth-first extension count. Unreadable subdirectories are ignored.
pub fn census(repo: &Path, max_depth: usize) -> ExtensionCensus {
    let mut counts = ExtensionCensus::default();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((repo.to_path_buf(), 0));

    while let Some((dir, depth)) = queue.pop_front() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Census cannot read {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if depth < max_depth && !is_skipped_dir(&name) {
                    queue.push_back((path, depth + 1));
                }
            } else if file_type.is_file() {
                counts.record(&path);
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_repo_with_structure;

    #[test]
    fn test_marker_beats_census() {
        let repo = create_repo_with_structure(&[
            ("tsconfig.json", "{}"),
            ("a.rb", ""),
            ("b.rb", ""),
            ("c.rb", ""),
        ]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::TypeScript);
    }

    #[test]
    fn test_marker_priority() {
        let repo = create_repo_with_structure(&[("composer.json", "{}"), ("Gemfile", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Php);

        let repo = create_repo_with_structure(&[("package.json", "{}"), ("Gemfile", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Ruby);

        let repo = create_repo_with_structure(&[("package.json", "{}"), ("index.php", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::JavaScript);

        let repo = create_repo_with_structure(&[("grove.gemspec", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Ruby);
    }

    #[test]
    fn test_census_ruby_only() {
        let repo = create_repo_with_structure(&[("lib/a.rb", ""), ("lib/b/c.rb", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Ruby);
    }

    #[test]
    fn test_census_ties_follow_priority() {
        let repo = create_repo_with_structure(&[("a.ts", ""), ("b.php", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::TypeScript);

        let repo = create_repo_with_structure(&[("a.js", ""), ("b.rb", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::JavaScript);

        let repo = create_repo_with_structure(&[("a.php", ""), ("b.rb", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Php);

        let repo = create_repo_with_structure(&[("a.php", ""), ("b.rb", ""), ("c.rb", "")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Ruby);
    }

    #[test]
    fn test_census_skips_dependencies_and_depth() {
        let repo = create_repo_with_structure(&[
            ("a.php", ""),
            ("node_modules/x/a.js", ""),
            ("node_modules/x/b.js", ""),
            ("a/b/c/d/e/deep.rb", ""),
            ("a/b/c/d/e/deeper.rb", ""),
        ]);
        let counts = census(repo.path(), DEFAULT_CENSUS_DEPTH);
        assert_eq!(counts.javascript, 0);
        assert_eq!(counts.ruby, 0);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::Php);
    }

    #[test]
    fn test_empty_repo_defaults_to_typescript() {
        let repo = create_repo_with_structure(&[("README.md", "# hi")]);
        assert_eq!(detect_language(repo.path()).unwrap(), Language::TypeScript);
    }

    #[test]
    fn test_missing_root_is_malformed() {
        let repo = create_repo_with_structure(&[("file.txt", "")]);
        let err = detect_language(&repo.path().join("nope")).unwrap_err();
        assert!(matches!(err, GraphError::MalformedProject { .. }));

        let err = detect_language(&repo.path().join("file.txt")).unwrap_err();
        assert!(matches!(err, GraphError::MalformedProject { .. }));
    }
}
