use tree_sitter::Node;

use super::types::node_text;

/// Parameter names bound implicitly by method calls; never exposed as props.
pub const IMPLICIT_PARAMS: &[&str] = &["self", "cls"];

/// One entry of a function's parameter list, classified by shape.
#[derive(Debug)]
pub enum ParamNode<'t> {
    /// `name`
    Plain { name: &'t str },
    /// `name=value`
    Defaulted { name: &'t str, default: Node<'t> },
    /// `name: T`
    Typed { name: &'t str, annotation: Node<'t> },
    /// `name: T = value`
    TypedDefaulted {
        name: &'t str,
        annotation: Node<'t>,
        default: Node<'t>,
    },
    /// `**kwargs` (typed or not): the component accepts arbitrary props.
    KeywordCatchAll,
    /// `*args` (typed or not): ignored.
    PositionalCatchAll,
    /// Separators (`*`, `/`), tuple patterns and comments: not parameters.
    Ignored,
}

impl<'t> ParamNode<'t> {
    /// Name of a named parameter; `None` for catch-alls and separators.
    pub fn name(&self) -> Option<&'t str> {
        match self {
            ParamNode::Plain { name }
            | ParamNode::Defaulted { name, .. }
            | ParamNode::Typed { name, .. }
            | ParamNode::TypedDefaulted { name, .. } => Some(*name),
            ParamNode::KeywordCatchAll | ParamNode::PositionalCatchAll | ParamNode::Ignored => {
                None
            }
        }
    }
}

/// Classify a single child of a `parameters` node.
pub fn classify_param<'t>(node: Node<'t>, source: &'t [u8]) -> ParamNode<'t> {
    let field_text = |field: &str| node.child_by_field_name(field).map(|n| node_text(n, source));

    match node.kind() {
        "identifier" => ParamNode::Plain {
            name: node_text(node, source),
        },
        "default_parameter" => match (field_text("name"), node.child_by_field_name("value")) {
            (Some(name), Some(default)) => ParamNode::Defaulted { name, default },
            _ => ParamNode::Ignored,
        },
        "typed_parameter" => {
            // The bound pattern is the first named child: a name or a splat.
            let Some(pattern) = node.named_child(0) else {
                return ParamNode::Ignored;
            };
            match (pattern.kind(), node.child_by_field_name("type")) {
                ("dictionary_splat_pattern", _) => ParamNode::KeywordCatchAll,
                ("list_splat_pattern", _) => ParamNode::PositionalCatchAll,
                ("identifier", Some(annotation)) => ParamNode::Typed {
                    name: node_text(pattern, source),
                    annotation,
                },
                _ => ParamNode::Ignored,
            }
        }
        "typed_default_parameter" => match (
            field_text("name"),
            node.child_by_field_name("type"),
            node.child_by_field_name("value"),
        ) {
            (Some(name), Some(annotation), Some(default)) => ParamNode::TypedDefaulted {
                name,
                annotation,
                default,
            },
            _ => ParamNode::Ignored,
        },
        "dictionary_splat_pattern" => ParamNode::KeywordCatchAll,
        "list_splat_pattern" => ParamNode::PositionalCatchAll,
        _ => ParamNode::Ignored,
    }
}

/// Classify every entry of a `parameters` node, in source order.
pub fn classify_parameters<'t>(parameters: Node<'t>, source: &'t [u8]) -> Vec<ParamNode<'t>> {
    let mut cursor = parameters.walk();
    parameters
        .named_children(&mut cursor)
        .map(|child| classify_param(child, source))
        .collect()
}
