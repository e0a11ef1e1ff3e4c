//! Per-document syntax index built from one tree-sitter parse.
//!
//! The index keeps only owned data (spans, names, metrics) so it can be
//! cached and shared across threads independently of the parse tree.

use crate::complexity;
use crate::document::Document;
use crate::engine::{ComplexityMetrics, EngineError, EngineResult, SymbolInfo, SymbolKind};
use crate::parser::{ParseError, Parser};
use crate::position::Range;
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn of(node: Node) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
        }
    }

    /// Inclusive of the end so a cursor right after a token still hits it
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start <= end && start <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub symbol: SymbolInfo,
    pub span: Span,
    pub name_span: Span,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub callee: String,
    pub name_span: Span,
    /// Qualified name of the enclosing member
    pub caller: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MethodSyntax {
    pub name: String,
    pub container: Option<String>,
    pub span: Span,
    pub range: Range,
    pub metrics: ComplexityMetrics,
}

#[derive(Debug, Clone)]
pub struct FieldSyntax {
    pub name_span: Span,
    /// Where a modifier can be inserted in front of the field's type
    pub type_start: usize,
    pub is_readonly: bool,
}

#[derive(Debug, Clone)]
pub struct UsingSyntax {
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyntaxIndex {
    pub declarations: Vec<Declaration>,
    pub identifiers: Vec<Token>,
    pub invocations: Vec<Invocation>,
    pub methods: Vec<MethodSyntax>,
    pub fields: Vec<FieldSyntax>,
    pub usings: Vec<UsingSyntax>,
    pub parse_errors: Vec<ParseError>,
    pub empty_catches: Vec<Span>,
}

impl SyntaxIndex {
    pub fn build(document: &Document) -> EngineResult<Self> {
        let mut parser = Parser::new()?;
        let source = document.text();
        let tree = parser.parse(source)?;

        let mut builder = IndexBuilder {
            document,
            source: source.as_bytes(),
            index: SyntaxIndex::default(),
            containers: Vec::new(),
            member: None,
        };
        builder.visit(tree.root_node())?;

        let mut index = builder.index;
        index.parse_errors = Parser::extract_errors(&tree, source);
        Ok(index)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.declarations.iter().map(|d| &d.symbol)
    }

    /// Identifier token at `offset`, preferring one that strictly contains it
    pub fn identifier_at(&self, offset: usize) -> Option<&Token> {
        self.identifiers
            .iter()
            .find(|t| t.span.start <= offset && offset < t.span.end)
            .or_else(|| self.identifiers.iter().find(|t| t.span.end == offset))
    }

    /// Declaration whose name token is at `offset`
    pub fn declaration_named_at(&self, offset: usize) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name_span.touches(offset))
    }

    /// Innermost method or constructor containing `offset`
    pub fn method_containing(&self, offset: usize) -> Option<&MethodSyntax> {
        self.methods
            .iter()
            .filter(|m| m.span.touches(offset))
            .min_by_key(|m| m.span.end - m.span.start)
    }
}

struct IndexBuilder<'a> {
    document: &'a Document,
    source: &'a [u8],
    index: SyntaxIndex,
    /// Enclosing namespaces and types, innermost last
    containers: Vec<String>,
    member: Option<String>,
}

impl<'a> IndexBuilder<'a> {
    fn visit(&mut self, node: Node) -> EngineResult<()> {
        match node.kind() {
            "namespace_declaration" => return self.visit_scope(node, SymbolKind::Namespace),
            "file_scoped_namespace_declaration" => {
                // Applies to the rest of the file, so the container is never popped
                if let Some(name) = self.declare(node, SymbolKind::Namespace)? {
                    self.containers.push(name);
                }
            }
            "class_declaration" => return self.visit_scope(node, SymbolKind::Class),
            "struct_declaration" => return self.visit_scope(node, SymbolKind::Struct),
            "interface_declaration" => return self.visit_scope(node, SymbolKind::Interface),
            "enum_declaration" => return self.visit_scope(node, SymbolKind::Enum),
            "record_declaration" | "record_struct_declaration" => {
                return self.visit_scope(node, SymbolKind::Record)
            }
            "delegate_declaration" => {
                self.declare(node, SymbolKind::Delegate)?;
            }
            "enum_member_declaration" => {
                self.declare(node, SymbolKind::EnumMember)?;
            }
            "method_declaration" => return self.visit_method(node, SymbolKind::Method),
            "constructor_declaration" => return self.visit_method(node, SymbolKind::Constructor),
            "property_declaration" => return self.visit_member(node, SymbolKind::Property),
            "event_declaration" => return self.visit_member(node, SymbolKind::Event),
            "field_declaration" => self.visit_field(node, SymbolKind::Field)?,
            "event_field_declaration" => self.visit_field(node, SymbolKind::Event)?,
            "invocation_expression" => {
                let function = node
                    .child_by_field_name("function")
                    .or_else(|| node.named_child(0));
                self.record_call(function);
            }
            "object_creation_expression" => {
                let created = node.child_by_field_name("type").or_else(|| {
                    let mut cursor = node.walk();
                    let first = node
                        .named_children(&mut cursor)
                        .find(|child| child.kind() != "argument_list");
                    first
                });
                self.record_call(created);
            }
            "identifier" => {
                if let Some(name) = self.text(node) {
                    self.index.identifiers.push(Token {
                        name,
                        span: Span::of(node),
                    });
                }
            }
            "using_directive" => {
                let top_level = node
                    .parent()
                    .map_or(false, |parent| parent.kind() == "compilation_unit");
                if top_level {
                    if let Some(text) = self.text(node) {
                        self.index.usings.push(UsingSyntax {
                            span: Span::of(node),
                            text: text.trim().to_string(),
                        });
                    }
                }
            }
            "catch_clause" => {
                let body = node.child_by_field_name("body").or_else(|| {
                    let mut cursor = node.walk();
                    let block = node
                        .named_children(&mut cursor)
                        .find(|child| child.kind() == "block");
                    block
                });
                if body.map_or(false, |block| block.named_child_count() == 0) {
                    self.index.empty_catches.push(Span::of(node));
                }
            }
            _ => {}
        }

        self.visit_children(node)
    }

    fn visit_children(&mut self, node: Node) -> EngineResult<()> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_scope(&mut self, node: Node, kind: SymbolKind) -> EngineResult<()> {
        let name = self.declare(node, kind)?;
        let pushed = name.is_some();
        if let Some(name) = name {
            self.containers.push(name);
        }
        self.visit_children(node)?;
        if pushed {
            self.containers.pop();
        }
        Ok(())
    }

    fn visit_method(&mut self, node: Node, kind: SymbolKind) -> EngineResult<()> {
        if let Some(name) = self.declare(node, kind)? {
            let source = self.document.text();
            self.index.methods.push(MethodSyntax {
                name,
                container: self.containers.last().cloned(),
                span: Span::of(node),
                range: self.range(Span::of(node))?,
                metrics: complexity::measure(node, source),
            });
        }
        self.visit_member_body(node)
    }

    fn visit_member(&mut self, node: Node, kind: SymbolKind) -> EngineResult<()> {
        self.declare(node, kind)?;
        self.visit_member_body(node)
    }

    /// Visit a member's children with it recorded as the current caller
    fn visit_member_body(&mut self, node: Node) -> EngineResult<()> {
        let qualified = self.declarations_qualified_name(node);
        let previous = std::mem::replace(&mut self.member, qualified);
        let result = self.visit_children(node);
        self.member = previous;
        result
    }

    fn declarations_qualified_name(&self, node: Node) -> Option<String> {
        let span = Span::of(node);
        self.index
            .declarations
            .iter()
            .rev()
            .find(|d| d.span == span)
            .map(|d| d.symbol.qualified_name())
    }

    fn visit_field(&mut self, node: Node, kind: SymbolKind) -> EngineResult<()> {
        let is_readonly = has_modifier(node, self.source, &["readonly", "const"]);
        let declaration = {
            let mut cursor = node.walk();
            let found = node
                .named_children(&mut cursor)
                .find(|child| child.kind() == "variable_declaration");
            found
        };
        let Some(declaration) = declaration else {
            return Ok(());
        };
        let type_start = declaration
            .child_by_field_name("type")
            .unwrap_or(declaration)
            .start_byte();

        let declarators: Vec<Node> = {
            let mut cursor = declaration.walk();
            let found = declaration
                .named_children(&mut cursor)
                .filter(|child| child.kind() == "variable_declarator")
                .collect();
            found
        };

        for declarator in declarators {
            let Some(name_node) = name_node(declarator) else {
                continue;
            };
            let Some(name) = self.text(name_node) else {
                continue;
            };
            let name_span = Span::of(name_node);
            self.push_declaration(name, kind, Span::of(node), name_span)?;
            if kind == SymbolKind::Field {
                self.index.fields.push(FieldSyntax {
                    name_span,
                    type_start,
                    is_readonly,
                });
            }
        }
        Ok(())
    }

    fn record_call(&mut self, target: Option<Node>) {
        if let Some(name) = target.and_then(invoked_name) {
            if let Some(callee) = self.text(name) {
                self.index.invocations.push(Invocation {
                    callee,
                    name_span: Span::of(name),
                    caller: self.member.clone(),
                });
            }
        }
    }

    /// Record a declaration for `node`, returning its name
    fn declare(&mut self, node: Node, kind: SymbolKind) -> EngineResult<Option<String>> {
        let Some(name_node) = name_node(node) else {
            return Ok(None);
        };
        let Some(name) = self.text(name_node) else {
            return Ok(None);
        };
        self.push_declaration(name.clone(), kind, Span::of(node), Span::of(name_node))?;
        Ok(Some(name))
    }

    fn push_declaration(
        &mut self,
        name: String,
        kind: SymbolKind,
        span: Span,
        name_span: Span,
    ) -> EngineResult<()> {
        let symbol = SymbolInfo {
            name,
            kind,
            container_name: self.containers.last().cloned(),
            path: self.document.path().to_string(),
            range: self.range(span)?,
            selection_range: self.range(name_span)?,
        };
        self.index.declarations.push(Declaration {
            symbol,
            span,
            name_span,
        });
        Ok(())
    }

    fn range(&self, span: Span) -> EngineResult<Range> {
        self.document
            .range_of(span.start, span.end)
            .map_err(|e| EngineError::Failed(e.to_string()))
    }

    fn text(&self, node: Node) -> Option<String> {
        node.utf8_text(self.source).ok().map(str::to_string)
    }
}

/// Name of a declaration node
fn name_node(node: Node) -> Option<Node> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(name);
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    if let Some(list) = children.iter().position(|c| c.kind() == "parameter_list") {
        if let Some(name) = children[..list].iter().rev().find(|c| c.kind() == "identifier") {
            return Some(*name);
        }
    }
    children.into_iter().find(|c| c.kind() == "identifier")
}

/// The simple name token of an invoked or constructed expression
fn invoked_name(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" => Some(node),
        "generic_name" => {
            let mut cursor = node.walk();
            let identifier = node
                .named_children(&mut cursor)
                .find(|child| child.kind() == "identifier");
            identifier
        }
        "member_access_expression" | "qualified_name" => node
            .child_by_field_name("name")
            .or_else(|| {
                let count = node.named_child_count();
                if count == 0 {
                    None
                } else {
                    node.named_child(count - 1)
                }
            })
            .and_then(invoked_name),
        _ => None,
    }
}

fn has_modifier(node: Node, source: &[u8], modifiers: &[&str]) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| {
        if child.kind() == "modifier" {
            child
                .utf8_text(source)
                .map_or(false, |text| modifiers.contains(&text.trim()))
        } else {
            modifiers.contains(&child.kind())
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"using System;

namespace Shop
{
    public class OrderService
    {
        private int count;
        private readonly string name = "orders";

        public OrderService() { }

        public int Total { get; set; }

        public async Task LoadAsync()
        {
            Validate();
            var order = new Order();
        }

        private void Validate()
        {
            try { count++; } catch (Exception) { }
        }
    }

    public class Order { }

    public enum Status { Open, Closed }
}
"#;

    fn index() -> SyntaxIndex {
        SyntaxIndex::build(&Document::new("Shop/OrderService.cs", SOURCE, 0)).unwrap()
    }

    fn find<'i>(index: &'i SyntaxIndex, name: &str) -> &'i SymbolInfo {
        index
            .symbols()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("symbol {} should be declared", name))
    }

    #[test]
    fn test_declarations_and_containers() {
        let index = index();

        assert_eq!(find(&index, "Shop").kind, SymbolKind::Namespace);
        let service = find(&index, "OrderService");
        assert_eq!(service.kind, SymbolKind::Class);
        assert_eq!(service.container_name.as_deref(), Some("Shop"));

        let load = find(&index, "LoadAsync");
        assert_eq!(load.kind, SymbolKind::Method);
        assert_eq!(load.container_name.as_deref(), Some("OrderService"));
        assert_eq!(load.selection_range.start.line, 13);

        assert_eq!(find(&index, "count").kind, SymbolKind::Field);
        assert_eq!(find(&index, "Total").kind, SymbolKind::Property);
        assert_eq!(find(&index, "Open").kind, SymbolKind::EnumMember);
        assert_eq!(find(&index, "Status").kind, SymbolKind::Enum);
        assert!(index
            .symbols()
            .any(|s| s.name == "OrderService" && s.kind == SymbolKind::Constructor));
    }

    #[test]
    fn test_invocations_record_their_caller() {
        let index = index();

        let validate = index
            .invocations
            .iter()
            .find(|i| i.callee == "Validate")
            .expect("Validate call should be indexed");
        assert_eq!(validate.caller.as_deref(), Some("OrderService.LoadAsync"));

        let creation = index.invocations.iter().find(|i| i.callee == "Order");
        assert!(creation.is_some(), "object creation should be indexed as a call");
    }

    #[test]
    fn test_fields_usings_and_empty_catches() {
        let index = index();

        assert_eq!(index.fields.len(), 2);
        assert!(!index.fields[0].is_readonly);
        assert!(index.fields[1].is_readonly);
        assert_eq!(index.usings.len(), 1);
        assert_eq!(index.usings[0].text, "using System;");
        assert_eq!(index.empty_catches.len(), 1);
        assert!(index.parse_errors.is_empty());
    }

    #[test]
    fn test_identifier_lookup() {
        let index = index();
        let load = find(&index, "LoadAsync").clone();
        let document = Document::new("Shop/OrderService.cs", SOURCE, 0);
        let offset = document.offset_at(load.selection_range.start).unwrap();

        let token = index.identifier_at(offset).unwrap();
        assert_eq!(token.name, "LoadAsync");
        assert!(index.declaration_named_at(offset).is_some());
        assert_eq!(index.method_containing(offset).unwrap().name, "LoadAsync");
    }
}
