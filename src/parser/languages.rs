use tree_sitter::Language;

/// Extension of backend source files, the only ones the extractor parses.
pub const PYTHON_EXTENSION: &str = "py";

/// The Python grammar used for component extraction.
pub fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}
