//! Repo-relative path helpers. All graph paths are `/`-separated strings.

use std::path::{Component, Path};

/// Convert a path under `root` to the `/`-separated form used in node ids.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Directory part of a relative file path (`""` for files at the root).
pub fn parent_dir(file: &str) -> &str {
    file.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Lexically join `spec` onto `dir`. Returns `None` when the result would
/// leave the repository root.
pub fn join_normalized(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_join_normalized() {
        assert_eq!(join_normalized("src/app", "./utils").as_deref(), Some("src/app/utils"));
        assert_eq!(join_normalized("src/app", "../lib/x").as_deref(), Some("src/lib/x"));
        assert_eq!(join_normalized("", "./a").as_deref(), Some("a"));
        assert_eq!(join_normalized("src", "../../escape"), None);
    }

    #[test]
    fn test_relative_path() {
        let root = PathBuf::from("/repo");
        assert_eq!(
            relative_path(&root, &root.join("src").join("a.ts")).as_deref(),
            Some("src/a.ts")
        );
        assert_eq!(relative_path(&root, &root), None);
        assert_eq!(relative_path(&root, Path::new("/elsewhere/a.ts")), None);
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("src/a/b.ts"), "src/a");
        assert_eq!(parent_dir("b.ts"), "");
    }
}
