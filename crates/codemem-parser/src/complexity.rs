// ABOUTME: Complexity scoring from tree-sitter AST nodes
// ABOUTME: Branches + loops + boolean operators, bucketed into low/medium/high

use tree_sitter::Node;

pub const MEDIUM_THRESHOLD: usize = 5;
pub const HIGH_THRESHOLD: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityBucket {
    Low,
    Medium,
    High,
}

impl ComplexityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityBucket::Low => "low",
            ComplexityBucket::Medium => "medium",
            ComplexityBucket::High => "high",
        }
    }
}

pub fn bucket(score: usize) -> ComplexityBucket {
    if score >= HIGH_THRESHOLD {
        ComplexityBucket::High
    } else if score >= MEDIUM_THRESHOLD {
        ComplexityBucket::Medium
    } else {
        ComplexityBucket::Low
    }
}

/// Count decision points in a subtree: branches, loops, and boolean
/// operators. The bucket thresholds are fixed so scores stay comparable
/// across runs.
pub fn decision_points(node: &Node, source: &[u8]) -> usize {
    let kind = node.kind();
    let mut count = usize::from(is_decision_point(kind));

    if matches!(
        kind,
        "boolean_operator" | "binary_expression" | "logical_expression"
    ) {
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                if matches!(cursor.node().kind(), "&&" | "||" | "and" | "or") {
                    count += 1;
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }

    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            count += decision_points(&cursor.node(), source);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }

    count
}

fn is_decision_point(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "if_expression"
            | "elif_clause"
            | "else_if_clause"
            | "conditional_expression"
            | "ternary_expression"
            | "while_statement"
            | "do_statement"
            | "for_statement"
            | "for_in_statement"
            | "for_of_statement"
            | "match_statement"
            | "switch_statement"
            | "case_clause"
            | "except_clause"
            | "catch_clause"
    )
}
