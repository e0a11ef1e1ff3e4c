//! Complexity metrics for a single method declaration node.

use crate::engine::ComplexityMetrics;
use std::cmp::max;
use tree_sitter::Node;

/// Structures that add a nesting level for cognitive complexity
const NESTING_STRUCTURES: &[&str] = &[
    "switch_statement",
    "switch_expression",
    "for_statement",
    "for_each_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "conditional_expression",
];

/// Bodies that deepen nesting without adding to the score
const NESTED_FUNCTIONS: &[&str] = &[
    "lambda_expression",
    "anonymous_method_expression",
    "local_function_statement",
];

pub fn measure(method: Node, source: &str) -> ComplexityMetrics {
    let mut cognitive = Cognitive::default();
    cognitive.walk(method, source.as_bytes(), 0, false);

    let text = &source[method.start_byte()..method.end_byte()];

    ComplexityMetrics {
        cyclomatic: 1 + decision_points(method),
        cognitive: cognitive.score,
        nesting: cognitive.max_nesting,
        loc: lines_of_code(text),
        parameters: parameter_count(method),
    }
}

/// Branching tokens below `node`, counted on the anonymous keyword and
/// operator tokens so every form of a construct is covered.
fn decision_points(node: Node) -> u32 {
    let own = match node.kind() {
        "if" | "while" | "for" | "foreach" | "case" | "catch" | "&&" | "||" | "??" => 1,
        "?" if node.parent().map_or(false, |p| p.kind() == "conditional_expression") => 1,
        "switch_expression_arm" => 1,
        _ => 0,
    };

    let mut cursor = node.walk();
    let nested: u32 = node.children(&mut cursor).map(decision_points).sum();
    own + nested
}

#[derive(Default)]
struct Cognitive {
    score: u32,
    max_nesting: u32,
}

impl Cognitive {
    fn walk(&mut self, node: Node, source: &[u8], nesting: u32, else_if: bool) {
        let kind = node.kind();

        if kind == "if_statement" {
            self.score += if else_if { 1 } else { 1 + nesting };
            self.max_nesting = max(self.max_nesting, nesting + 1);

            let mut after_else = false;
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if !child.is_named() {
                    after_else |= child.kind() == "else";
                    continue;
                }
                if after_else {
                    if child.kind() == "if_statement" {
                        self.walk(child, source, nesting, true);
                    } else {
                        self.score += 1;
                        self.walk(child, source, nesting + 1, false);
                    }
                } else {
                    self.walk(child, source, nesting + 1, false);
                }
            }
            return;
        }

        let mut child_nesting = nesting;
        if NESTING_STRUCTURES.contains(&kind) {
            self.score += 1 + nesting;
            self.max_nesting = max(self.max_nesting, nesting + 1);
            child_nesting = nesting + 1;
        } else if NESTED_FUNCTIONS.contains(&kind) {
            child_nesting = nesting + 1;
        } else if kind == "binary_expression" {
            if let Some(operator) = logical_operator(node) {
                let continues_sequence = node
                    .parent()
                    .filter(|parent| parent.kind() == "binary_expression")
                    .and_then(logical_operator)
                    .map_or(false, |parent_operator| parent_operator == operator);
                if !continues_sequence {
                    self.score += 1;
                }
            }
        } else if kind == "goto_statement" {
            self.score += 1;
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, source, child_nesting, false);
        }
    }
}

fn logical_operator(node: Node) -> Option<&'static str> {
    let mut cursor = node.walk();
    let operator = node
        .children(&mut cursor)
        .filter(|child| !child.is_named())
        .find_map(|child| match child.kind() {
            "&&" => Some("&&"),
            "||" => Some("||"),
            _ => None,
        });
    operator
}

fn parameter_count(method: Node) -> u32 {
    let parameters = method.child_by_field_name("parameters").or_else(|| {
        let mut cursor = method.walk();
        let list = method
            .named_children(&mut cursor)
            .find(|child| child.kind() == "parameter_list");
        list
    });

    match parameters {
        Some(list) => {
            let mut cursor = list.walk();
            let count = list
                .named_children(&mut cursor)
                .filter(|child| matches!(child.kind(), "parameter" | "parameter_array"))
                .count();
            count as u32
        }
        None => 0,
    }
}

/// Non-blank lines that are not purely comments
pub fn lines_of_code(text: &str) -> u32 {
    let mut count = 0;
    let mut in_block_comment = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if in_block_comment {
            if let Some(end) = trimmed.find("*/") {
                in_block_comment = false;
                if !trimmed[end + 2..].trim().is_empty() {
                    count += 1;
                }
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if trimmed.starts_with("/*") {
            match trimmed.find("*/") {
                Some(end) if !trimmed[end + 2..].trim().is_empty() => count += 1,
                Some(_) => {}
                None => in_block_comment = true,
            }
            continue;
        }
        count += 1;
    }

    count
}
