use crate::engine::{EngineError, EngineResult};
use tracing::debug;
use tree_sitter::{Language, Node, Parser as TreeSitterParser, Tree};

pub struct Parser {
    parser: TreeSitterParser,
}

impl Parser {
    pub fn new() -> EngineResult<Self> {
        let mut parser = TreeSitterParser::new();
        parser
            .set_language(Self::language())
            .map_err(|e| EngineError::Failed(format!("Error loading C# grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// The C# language definition
    pub fn language() -> Language {
        tree_sitter_c_sharp::language()
    }

    /// Parse a string of C# source code
    pub fn parse(&mut self, source: &str) -> EngineResult<Tree> {
        debug!("Parsing {} bytes", source.len());
        self.parser
            .parse(source, None)
            .ok_or_else(|| EngineError::Failed("Failed to parse source code".to_string()))
    }

    /// Extract error information from a tree with source text for better messages
    pub fn extract_errors(tree: &Tree, source: &str) -> Vec<ParseError> {
        let mut errors = Vec::new();
        if tree.root_node().has_error() {
            Self::collect_errors(tree.root_node(), source.as_bytes(), &mut errors);
        }
        errors
    }

    /// Recursively collect all error nodes
    fn collect_errors(node: Node, source: &[u8], errors: &mut Vec<ParseError>) {
        if node.is_error() || node.is_missing() {
            errors.push(ParseError {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                kind: node.kind().to_string(),
                is_missing: node.is_missing(),
                actual_text: node
                    .utf8_text(source)
                    .ok()
                    .filter(|text| !text.is_empty())
                    .map(|text| text.lines().next().unwrap_or(text).to_string()),
                parent_kind: node.parent().map(|parent| parent.kind().to_string()),
            });
            // Children of an error node are the unparsed tokens themselves
            if node.is_error() {
                return;
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::collect_errors(child, source, errors);
        }
    }
}

/// Represents a parse error found in the syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub start_byte: usize,
    pub end_byte: usize,
    pub kind: String,
    pub is_missing: bool,
    pub actual_text: Option<String>,
    pub parent_kind: Option<String>,
}
