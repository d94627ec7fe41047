use std::path::{Path, PathBuf};

use crate::parser::languages::PYTHON_EXTENSION;

/// Directory holding compiled bytecode next to backend sources.
pub const BUILD_CACHE_DIR: &str = "__pycache__";

/// Directories never descended into by the component walk.
const HARD_EXCLUDED_DIRS: &[&str] = &["node_modules", BUILD_CACHE_DIR];

/// Walk `root` and collect Python sources for component extraction.
///
/// Respects `.gitignore` rules, always excludes `node_modules` and build-cache
/// directories, and applies the glob patterns in `exclude` to paths relative to
/// `project_root`. Results are sorted so that registry output is stable
/// between runs.
pub fn walk_component_sources(
    root: &Path,
    project_root: &Path,
    exclude: &[String],
) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        // Read .gitignore files even when the directory is not inside a git repository.
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "walk error");
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }
        if has_excluded_component(path) {
            continue;
        }
        let relative = path.strip_prefix(project_root).unwrap_or(path);
        if is_excluded_by_patterns(relative, exclude) {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != PYTHON_EXTENSION {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    files
}

/// Walk the application tree and collect every file except build-cache entries.
///
/// No ignore files are consulted: whatever sits under the application tree can
/// be served, so it all counts. A missing root yields an empty list.
pub fn walk_app_tree(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| !ft.is_dir()))
        .map(|entry| entry.into_path())
        .filter(|path| !is_build_cache_path(path))
        .collect();

    files.sort();
    files
}

/// True if `path` lies inside a build-cache directory or is a compiled cache file.
pub fn is_build_cache_path(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == BUILD_CACHE_DIR)
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "pyc")
}

fn has_excluded_component(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| HARD_EXCLUDED_DIRS.contains(&s))
    })
}

/// Returns true if the project-relative `path` matches any exclusion pattern,
/// either as a whole or through one of its components.
fn is_excluded_by_patterns(path: &Path, patterns: &[String]) -> bool {
    let path_str = crate::parser::components::relative_display(path, Path::new(""));

    for pattern in patterns {
        let Ok(matcher) = glob::Pattern::new(pattern) else {
            tracing::warn!(pattern, "ignoring invalid exclude pattern");
            continue;
        };
        if matcher.matches(&path_str) {
            return true;
        }
        if path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|s| matcher.matches(s))
        {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_component_walk_returns_only_python_files() {
        let dir = tmp();
        fs::write(dir.path().join("button.py"), "").unwrap();
        fs::write(dir.path().join("README.md"), "# Hello").unwrap();
        fs::write(dir.path().join("index.html"), "<p/>").unwrap();

        let files = walk_component_sources(dir.path(), dir.path(), &[]);
        assert_eq!(names(&files), vec!["button.py"]);
    }

    #[test]
    fn test_component_walk_skips_cache_and_node_modules() {
        let dir = tmp();
        let cache = dir.path().join("__pycache__");
        let nm = dir.path().join("node_modules").join("pkg");
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&nm).unwrap();
        fs::write(cache.join("stale.py"), "").unwrap();
        fs::write(nm.join("vendored.py"), "").unwrap();
        fs::write(dir.path().join("card.py"), "").unwrap();

        let files = walk_component_sources(dir.path(), dir.path(), &[]);
        assert_eq!(names(&files), vec!["card.py"]);
    }

    #[test]
    fn test_component_walk_respects_exclude_patterns() {
        let dir = tmp();
        let legacy = dir.path().join("legacy");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("old.py"), "").unwrap();
        fs::write(dir.path().join("new.py"), "").unwrap();
        fs::write(dir.path().join("test_new.py"), "").unwrap();

        let exclude = vec!["legacy".to_string(), "test_*.py".to_string()];
        let files = walk_component_sources(dir.path(), dir.path(), &exclude);
        assert_eq!(names(&files), vec!["new.py"]);
    }

    #[test]
    fn test_exclude_patterns_are_project_relative() {
        let dir = tmp();
        let src = dir.path().join("src");
        let legacy = src.join("legacy");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("old.py"), "").unwrap();
        fs::write(src.join("new.py"), "").unwrap();

        let exclude = vec!["src/legacy/**".to_string()];
        let files = walk_component_sources(&src, dir.path(), &exclude);
        assert_eq!(names(&files), vec!["new.py"]);
    }

    #[test]
    fn test_exclude_pattern_never_matches_ancestor_dirs() {
        let dir = tmp();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("card.py"), "").unwrap();

        // Every component of the project root itself is an ancestor, never a match.
        let ancestors: Vec<String> = dir
            .path()
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .filter(|s| !s.is_empty() && *s != "/")
            .map(|s| s.to_string())
            .collect();
        assert!(!ancestors.is_empty());

        let files = walk_component_sources(&src, dir.path(), &ancestors);
        assert_eq!(names(&files), vec!["card.py"]);
    }

    #[test]
    fn test_component_walk_respects_gitignore() {
        let dir = tmp();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        let generated = dir.path().join("generated");
        fs::create_dir_all(&generated).unwrap();
        fs::write(generated.join("g.py"), "").unwrap();
        fs::write(dir.path().join("kept.py"), "").unwrap();

        let files = walk_component_sources(dir.path(), dir.path(), &[]);
        assert_eq!(names(&files), vec!["kept.py"]);
    }

    #[test]
    fn test_app_walk_lists_all_but_cache() {
        let dir = tmp();
        let about = dir.path().join("about");
        let cache = dir.path().join("__pycache__");
        fs::create_dir_all(&about).unwrap();
        fs::create_dir_all(&cache).unwrap();
        fs::write(dir.path().join("index.py"), "").unwrap();
        fs::write(about.join("index.html"), "").unwrap();
        fs::write(about.join("style.css"), "").unwrap();
        fs::write(cache.join("index.cpython-312.pyc"), "").unwrap();

        let files = walk_app_tree(dir.path());
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !is_build_cache_path(f)));
    }

    #[test]
    fn test_app_walk_of_missing_root_is_empty() {
        let dir = tmp();
        assert!(walk_app_tree(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_build_cache_detection() {
        assert!(is_build_cache_path(Path::new("src/app/__pycache__/x.cpython-312.pyc")));
        assert!(is_build_cache_path(Path::new("src/app/x.pyc")));
        assert!(!is_build_cache_path(Path::new("src/app/x.py")));
    }
}
