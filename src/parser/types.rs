use std::collections::HashMap;

use tree_sitter::Node;

/// Module-level alias name -> resolved literal option values. Scoped to one file.
pub type TypeAliasTable = HashMap<String, Vec<String>>;

/// The closed set of annotation shapes the option resolver distinguishes.
///
/// Every tree-sitter node kind that can appear in an annotation is funnelled
/// into one of these before any decision is made.
#[derive(Debug)]
pub enum TypeForm<'t> {
    /// `Literal[...]`, `typing.Literal[...]`: the listed members.
    Literal(Vec<Node<'t>>),
    /// `Union[...]`, `A | B`: the alternative member types, flattened.
    Union(Vec<Node<'t>>),
    /// A bare identifier, possibly an alias declared at module level.
    Name(&'t str),
    /// Anything else (generics, attributes, calls, ...).
    Other(Node<'t>),
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

pub(crate) fn node_text<'t>(node: Node<'t>, source: &'t [u8]) -> &'t str {
    node.utf8_text(source).unwrap_or("")
}

/// Strip the grammar's `type` wrapper nodes down to the annotation expression.
fn unwrap_type(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "type" {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Last segment of a dotted head: `Literal` for both `Literal` and `typing.Literal`.
fn head_name<'t>(node: Node<'t>, source: &'t [u8]) -> &'t str {
    match node.kind() {
        "identifier" => node_text(node, source),
        "attribute" => node
            .child_by_field_name("attribute")
            .map(|attr| node_text(attr, source))
            .unwrap_or(""),
        _ => "",
    }
}

/// Strip string prefixes (`r`, `b`, `f`, `u`) and matching quotes.
pub(crate) fn unquote(raw: &str) -> String {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return body[quote.len()..body.len() - quote.len()].to_string();
        }
    }
    raw.to_string()
}

/// Collect the members of a subscript, flattening an explicit tuple (`X[("a", "b")]`).
fn subscript_members(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let members: Vec<Node> = node
        .children_by_field_name("subscript", &mut cursor)
        .collect();
    if let [only] = members.as_slice()
        && matches!(only.kind(), "tuple" | "expression_list")
    {
        let mut cursor = only.walk();
        return only.named_children(&mut cursor).collect();
    }
    members
}

/// Flatten `A | B | C` (either the expression or the annotation form) into its members.
fn flatten_pipe<'t>(node: Node<'t>, source: &'t [u8], out: &mut Vec<Node<'t>>) {
    let node = unwrap_type(node);
    if is_pipe_union(node, source) {
        let mut cursor = node.walk();
        let operands: Vec<Node> = if node.kind() == "union_type" {
            node.named_children(&mut cursor).collect()
        } else {
            [node.child_by_field_name("left"), node.child_by_field_name("right")]
                .into_iter()
                .flatten()
                .collect()
        };
        for operand in operands {
            flatten_pipe(operand, source, out);
        }
    } else {
        out.push(node);
    }
}

fn is_pipe_union(node: Node<'_>, source: &[u8]) -> bool {
    match node.kind() {
        "union_type" => true,
        "binary_operator" => node
            .child_by_field_name("operator")
            .is_some_and(|op| node_text(op, source) == "|"),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Map an annotation (or alias right-hand side) node onto a [`TypeForm`].
pub fn classify<'t>(node: Node<'t>, source: &'t [u8]) -> TypeForm<'t> {
    let node = unwrap_type(node);
    match node.kind() {
        "subscript" => {
            let head = node
                .child_by_field_name("value")
                .map(|value| head_name(value, source))
                .unwrap_or("");
            match head {
                "Literal" => TypeForm::Literal(subscript_members(node)),
                "Union" => TypeForm::Union(subscript_members(node)),
                _ => TypeForm::Other(node),
            }
        }
        "generic_type" => {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            let head = children
                .iter()
                .find(|c| c.kind() == "identifier")
                .map(|c| node_text(*c, source))
                .unwrap_or("");
            let members = children
                .iter()
                .find(|c| c.kind() == "type_parameter")
                .map(|params| {
                    let mut cursor = params.walk();
                    params.named_children(&mut cursor).collect()
                })
                .unwrap_or_default();
            match head {
                "Literal" => TypeForm::Literal(members),
                "Union" => TypeForm::Union(members),
                _ => TypeForm::Other(node),
            }
        }
        "union_type" | "binary_operator" if is_pipe_union(node, source) => {
            let mut members = Vec::new();
            flatten_pipe(node, source, &mut members);
            TypeForm::Union(members)
        }
        "identifier" => TypeForm::Name(node_text(node, source)),
        _ => TypeForm::Other(node),
    }
}

// ---------------------------------------------------------------------------
// Option extraction
// ---------------------------------------------------------------------------

/// Literal members: strings unquoted, other primitives as raw text, nested
/// literal/union constructors descended into.
fn literal_options(members: &[Node<'_>], source: &[u8], out: &mut Vec<String>) {
    for member in members {
        match classify(*member, source) {
            TypeForm::Literal(inner) => literal_options(&inner, source, out),
            TypeForm::Union(inner) => union_options(&inner, source, out),
            TypeForm::Name(name) => out.push(name.to_string()),
            TypeForm::Other(node) if node.kind() == "string" => {
                out.push(unquote(node_text(node, source)))
            }
            TypeForm::Other(node) => out.push(node_text(node, source).to_string()),
        }
    }
}

/// Union members: each member's type name, nested literal/union members expanded.
fn union_options(members: &[Node<'_>], source: &[u8], out: &mut Vec<String>) {
    for member in members {
        match classify(*member, source) {
            TypeForm::Literal(inner) => literal_options(&inner, source, out),
            TypeForm::Union(inner) => union_options(&inner, source, out),
            TypeForm::Name(name) => out.push(name.to_string()),
            TypeForm::Other(node) => out.push(node_text(node, source).to_string()),
        }
    }
}

/// Options for a directly literal or union form, `None` for anything else.
fn direct_options(form: &TypeForm<'_>, source: &[u8]) -> Option<Vec<String>> {
    let mut out = Vec::new();
    match form {
        TypeForm::Literal(members) => literal_options(members, source, &mut out),
        TypeForm::Union(members) => union_options(members, source, &mut out),
        TypeForm::Name(_) | TypeForm::Other(_) => return None,
    }
    Some(out)
}

/// First literal or union form in `node`'s subtree, in source order.
fn first_nested_options(node: Node<'_>, source: &[u8]) -> Option<Vec<String>> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let form = classify(child, source);
        if let Some(options) = direct_options(&form, source) {
            return Some(options);
        }
        if let Some(options) = first_nested_options(child, source) {
            return Some(options);
        }
    }
    None
}

/// Resolve the allowed values for a typed parameter.
///
/// Tried in order: the annotation is itself a literal form; it is a union; it
/// is a bare alias name found in `aliases`; its subtree contains a literal or
/// union form (first one wins, e.g. `Optional[Literal["a", "b"]]`).
/// Returns `None` when no source yields a non-empty list.
pub fn resolve_options(
    annotation: Node<'_>,
    source: &[u8],
    aliases: &TypeAliasTable,
) -> Option<Vec<String>> {
    let form = classify(annotation, source);
    let options = match &form {
        TypeForm::Literal(_) | TypeForm::Union(_) => direct_options(&form, source),
        TypeForm::Name(name) => aliases.get(*name).cloned(),
        TypeForm::Other(node) => first_nested_options(*node, source),
    };
    options.filter(|o| !o.is_empty())
}

// ---------------------------------------------------------------------------
// Alias table
// ---------------------------------------------------------------------------

/// Collect module-level aliases whose right-hand side is a literal or union form.
///
/// Accepts `X = Literal[...]`, `X: TypeAlias = A | B` and `type X = ...`.
pub fn collect_aliases(module: Node<'_>, source: &[u8]) -> TypeAliasTable {
    let mut table = TypeAliasTable::new();
    let mut cursor = module.walk();

    for statement in module.named_children(&mut cursor) {
        let (left, right) = match statement.kind() {
            "expression_statement" => {
                let Some(assignment) = statement
                    .named_child(0)
                    .filter(|n| n.kind() == "assignment")
                else {
                    continue;
                };
                (
                    assignment.child_by_field_name("left"),
                    assignment.child_by_field_name("right"),
                )
            }
            "type_alias_statement" => (
                statement.child_by_field_name("left").map(unwrap_type),
                statement.child_by_field_name("right"),
            ),
            _ => continue,
        };

        let (Some(left), Some(right)) = (left, right) else {
            continue;
        };
        if left.kind() != "identifier" {
            continue;
        }

        let form = classify(right, source);
        if let Some(options) = direct_options(&form, source) {
            table.insert(node_text(left, source).to_string(), options);
        }
    }

    table
}
