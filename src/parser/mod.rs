pub mod components;
pub mod languages;
pub mod params;
pub mod types;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tree_sitter::{Parser, Tree};

use crate::error::ExtractError;

use components::{ComponentMetadata, extract_components};
use languages::python_language;

// One parser per rayon worker thread.
thread_local! {
    static PARSER_PY: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        p.set_language(&python_language())
            .expect("bundled python grammar matches the tree-sitter ABI");
        p
    });
}

/// Outcome of one extraction pass over a batch of files.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Components in file order, then source order within each file.
    pub components: Vec<ComponentMetadata>,
    /// Files whose contribution was dropped because they failed to read or parse.
    pub failures: Vec<ExtractError>,
    /// Number of files examined.
    pub file_count: usize,
}

/// Parse Python source, rejecting trees that contain syntax errors.
///
/// # Errors
/// Returns [`ExtractError::Parse`] if tree-sitter gives up or the tree has
/// error nodes; a partially understood module is never mined for components.
pub fn parse_source(path: &Path, source: &[u8]) -> Result<Tree, ExtractError> {
    let tree = PARSER_PY
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| ExtractError::Parse {
            path: path.to_path_buf(),
            reason: "tree-sitter returned no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(0);
        return Err(ExtractError::Parse {
            path: path.to_path_buf(),
            reason: format!("syntax error near line {line}"),
        });
    }

    Ok(tree)
}

fn first_error_line(node: tree_sitter::Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error_line)
}

/// Read, parse and extract components from a single file.
pub fn extract_file(
    path: &Path,
    project_root: &Path,
    markers: &[String],
) -> Result<Vec<ComponentMetadata>, ExtractError> {
    let source = std::fs::read(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = parse_source(path, &source)?;
    Ok(extract_components(
        &tree,
        &source,
        path,
        project_root,
        markers,
    ))
}

/// Extract components from every file, in parallel.
///
/// A failure is isolated to its file: it is logged, recorded in
/// [`Extraction::failures`], and the rest of the batch proceeds.
pub fn extract_all(files: &[PathBuf], project_root: &Path, markers: &[String]) -> Extraction {
    let results: Vec<Result<Vec<ComponentMetadata>, ExtractError>> = files
        .par_iter()
        .map(|path| extract_file(path, project_root, markers))
        .collect();

    let mut extraction = Extraction {
        file_count: files.len(),
        ..Extraction::default()
    };

    for result in results {
        match result {
            Ok(components) => extraction.components.extend(components),
            Err(err) => {
                tracing::warn!(error = %err, "skipping file during component extraction");
                extraction.failures.push(err);
            }
        }
    }

    extraction
}
