use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parser::components::relative_display;

/// Extensions of route-defining files: backend source and templates.
pub const ROUTE_EXTENSIONS: &[&str] = &["py", "html"];

/// Snapshot of route-defining paths. Membership only; content is irrelevant.
pub type RouteFileSet = BTreeSet<PathBuf>;

/// One servable route, derived from an `index.py` / `index.html` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Directory relative to the application root (`""` for the root).
    pub dir: String,
    /// URL rule, e.g. `/blog/{slug}`.
    pub rule: String,
    /// Index file serving the route: `index.py` wins over `index.html`.
    pub entry: String,
}

pub fn is_route_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ROUTE_EXTENSIONS.contains(&ext))
}

/// Route-defining subset of an application tree listing.
pub fn route_files(files: &[PathBuf]) -> RouteFileSet {
    files.iter().filter(|p| is_route_file(p)).cloned().collect()
}

/// Translate a route directory into a URL rule.
///
/// `(group)` segments vanish, `[id]` becomes `{id}`, `[...rest]` becomes
/// `{rest:path}`, anything else is kept verbatim.
pub fn route_rule(dir: &str) -> String {
    let segments: Vec<String> = dir
        .split('/')
        .filter(|s| !s.is_empty())
        .filter(|s| !(s.starts_with('(') && s.ends_with(')')))
        .map(|s| match s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner) => match inner.strip_prefix("...") {
                Some(name) => format!("{{{name}:path}}"),
                None => format!("{{{inner}}}"),
            },
            None => s.to_string(),
        })
        .collect();

    format!("/{}", segments.join("/"))
}

/// Derive the route table from a listing of the application tree.
pub fn route_table(app_root: &Path, files: &[PathBuf]) -> Vec<RouteEntry> {
    let mut by_dir: BTreeMap<String, &'static str> = BTreeMap::new();

    for file in files {
        let entry = match file.file_name().and_then(|n| n.to_str()) {
            Some("index.py") => "index.py",
            Some("index.html") => "index.html",
            _ => continue,
        };
        let dir = file
            .parent()
            .map(|parent| relative_display(parent, app_root))
            .unwrap_or_default();

        let slot = by_dir.entry(dir).or_insert(entry);
        if entry == "index.py" {
            *slot = entry;
        }
    }

    by_dir
        .into_iter()
        .map(|(dir, entry)| RouteEntry {
            rule: route_rule(&dir),
            dir,
            entry: entry.to_string(),
        })
        .collect()
}
