use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Tree};

use super::params::{IMPLICIT_PARAMS, ParamNode, classify_parameters};
use super::types::{TypeAliasTable, collect_aliases, node_text, resolve_options, unquote};

/// One prop accepted by a component function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentProp {
    pub name: String,
    /// Annotation source text; `None` for unannotated parameters.
    #[serde(rename = "type")]
    pub type_text: Option<String>,
    pub has_default: bool,
    /// Default value source text.
    pub default: Option<String>,
    /// Allowed literal values, when they could be inferred.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub options: Option<Vec<String>>,
}

/// Registry entry for one decorated component function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub name: String,
    /// Absolute path of the defining file.
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    /// Dotted import route, e.g. `src.lib.ui.button`.
    pub import_route: String,
    /// True when the function takes a `**kwargs` catch-all.
    pub accepts_arbitrary_props: bool,
    pub props: Vec<ComponentProp>,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `path` relative to `root` with `/` separators; falls back to the full path.
pub fn relative_display(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Dotted import route: extension stripped, separators replaced by dots.
pub fn import_route(relative_path: &str) -> String {
    let stem = relative_path
        .strip_suffix(".py")
        .unwrap_or(relative_path);
    stem.replace(['/', '\\'], ".")
}

// ---------------------------------------------------------------------------
// Decorator matching
// ---------------------------------------------------------------------------

/// Name a decorator expression refers to: `component`, `ui.component` and
/// `component(...)` all yield `component`.
fn decorator_name<'t>(decorator: Node<'t>, source: &'t [u8]) -> Option<&'t str> {
    let mut expr = decorator.named_child(0)?;
    loop {
        match expr.kind() {
            "identifier" => return Some(node_text(expr, source)),
            "attribute" => return Some(node_text(expr.child_by_field_name("attribute")?, source)),
            "call" => expr = expr.child_by_field_name("function")?,
            _ => return None,
        }
    }
}

/// The function definition of a `decorated_definition` whose closest decorator
/// is one of `markers`.
fn marked_function<'t>(
    decorated: Node<'t>,
    source: &'t [u8],
    markers: &[String],
) -> Option<Node<'t>> {
    let definition = decorated.child_by_field_name("definition")?;
    if definition.kind() != "function_definition" {
        return None;
    }
    let closest = definition.prev_named_sibling()?;
    if closest.kind() != "decorator" {
        return None;
    }
    let name = decorator_name(closest, source)?;
    markers.iter().any(|m| m == name).then_some(definition)
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

fn build_props(
    function: Node<'_>,
    source: &[u8],
    aliases: &TypeAliasTable,
) -> (Vec<ComponentProp>, bool) {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return (Vec::new(), false);
    };

    let mut props = Vec::new();
    let mut accepts_arbitrary = false;

    for param in classify_parameters(parameters, source) {
        if let Some(name) = param.name()
            && IMPLICIT_PARAMS.contains(&name)
        {
            continue;
        }

        let (name, annotation, default) = match param {
            ParamNode::Plain { name } => (name, None, None),
            ParamNode::Defaulted { name, default } => (name, None, Some(default)),
            ParamNode::Typed { name, annotation } => (name, Some(annotation), None),
            ParamNode::TypedDefaulted {
                name,
                annotation,
                default,
            } => (name, Some(annotation), Some(default)),
            ParamNode::KeywordCatchAll => {
                accepts_arbitrary = true;
                continue;
            }
            ParamNode::PositionalCatchAll | ParamNode::Ignored => continue,
        };

        props.push(ComponentProp {
            name: name.to_string(),
            type_text: annotation.map(|a| node_text(a, source).to_string()),
            has_default: default.is_some(),
            default: default.map(|d| node_text(d, source).to_string()),
            options: annotation.and_then(|a| resolve_options(a, source, aliases)),
        });
    }

    (props, accepts_arbitrary)
}

/// Singular spellings tried for a plural identifier: `ies`→`y`, `-es`, `-s`.
fn singular_candidates(plural: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(stem) = plural.strip_suffix("ies") {
        candidates.push(format!("{stem}y"));
    }
    if let Some(stem) = plural.strip_suffix("es") {
        candidates.push(stem.to_string());
    }
    if let Some(stem) = plural.strip_suffix('s') {
        candidates.push(stem.to_string());
    }
    candidates.retain(|c| !c.is_empty());
    candidates
}

/// Key text of a dictionary pair: strings unquoted, anything else verbatim.
fn dict_keys(dictionary: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut cursor = dictionary.walk();
    dictionary
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "pair")
        .filter_map(|pair| pair.child_by_field_name("key"))
        .map(|key| {
            let text = node_text(key, source);
            if key.kind() == "string" {
                unquote(text)
            } else {
                text.to_string()
            }
        })
        .collect()
}

/// Best-effort naming heuristic: a top-level `variants = {...}` in the body
/// supplies options for a `variant` prop that has none. Only consulted after
/// annotation-based resolution came up empty.
fn apply_mapping_options(function: Node<'_>, source: &[u8], props: &mut [ComponentProp]) {
    let Some(body) = function.child_by_field_name("body") else {
        return;
    };

    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let Some(assignment) = statement.named_child(0).filter(|n| n.kind() == "assignment")
        else {
            continue;
        };
        let (Some(left), Some(right)) = (
            assignment.child_by_field_name("left"),
            assignment.child_by_field_name("right"),
        ) else {
            continue;
        };
        if left.kind() != "identifier" || right.kind() != "dictionary" {
            continue;
        }

        let plural = node_text(left, source);
        let target = singular_candidates(plural)
            .into_iter()
            .find_map(|candidate| props.iter().position(|p| p.name == candidate));

        if let Some(index) = target
            && props[index].options.as_ref().is_none_or(|o| o.is_empty())
        {
            let keys = dict_keys(right, source);
            if !keys.is_empty() {
                props[index].options = Some(keys);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Extract every component declared in a parsed Python module.
///
/// # Parameters
/// - `tree`: syntax tree of `source`
/// - `path`: absolute path of the file (recorded verbatim)
/// - `project_root`: base for the relative path and the import route
/// - `markers`: decorator names recognised as the component marker
pub fn extract_components(
    tree: &Tree,
    source: &[u8],
    path: &Path,
    project_root: &Path,
    markers: &[String],
) -> Vec<ComponentMetadata> {
    let root = tree.root_node();
    let aliases = collect_aliases(root, source);
    let relative_path = relative_display(path, project_root);
    let route = import_route(&relative_path);

    let mut components = Vec::new();
    let mut stack = vec![root];

    // Depth-first, pushing children in reverse to keep source order.
    while let Some(node) = stack.pop() {
        if node.kind() == "decorated_definition"
            && let Some(function) = marked_function(node, source, markers)
        {
            let name = function
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default();
            let (mut props, accepts_arbitrary_props) = build_props(function, source, &aliases);
            apply_mapping_options(function, source, &mut props);

            components.push(ComponentMetadata {
                name,
                path: path.to_path_buf(),
                relative_path: relative_path.clone(),
                import_route: route.clone(),
                accepts_arbitrary_props,
                props,
            });
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    components
}
