//! Test utilities for Grove

use std::fs;

use tempfile::TempDir;

/// Create a temporary repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }

        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

/// The two-file TypeScript fixture: `b.ts` imports and extends `A` from `a.ts`.
pub fn create_ts_inheritance_repo(import_from: &str) -> TempDir {
    create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "export class A {}\n"),
        (
            "b.ts",
            &format!("import {{ A }} from '{import_from}';\n\nexport class B extends A {{}}\n"),
        ),
    ])
}
