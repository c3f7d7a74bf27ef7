use crate::languages::util::{count_lines, node_span, node_text, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, RelationType, Result};
use std::path::Path;
use tree_sitter::Node;

/// Style rules become entities named by their selector; `@import` lines
/// become imports relations.
pub struct CssParser {
    language: tree_sitter::Language,
}

impl CssParser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_css::LANGUAGE.into(),
        }
    }
}

impl Default for CssParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for CssParser {
    fn language(&self) -> &'static str {
        "css"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["css"]
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(source).map_err(|e| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| IndexError::Parse {
                file: file_path.display().to_string(),
                detail: e.to_string(),
            })?;
        let tree = parser.parse(text, None).ok_or_else(|| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: "tree-sitter produced no tree".to_string(),
        })?;

        let mut builder = OutcomeBuilder::new(file_path);
        let file_name = builder.file_entity(count_lines(text), None);

        let root = tree.root_node();
        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "rule_set" => emit_rule(&mut builder, &file_name, &child, source, None),
                "import_statement" => {
                    let target = import_target(&child, source);
                    if !target.is_empty() {
                        builder.relation(file_name.clone(), target, RelationType::Imports);
                    }
                }
                "media_statement" => {
                    // Rules inside @media are flattened; the query becomes
                    // part of the signature.
                    let query = media_query(&child, source);
                    let mut inner_cursor = child.walk();
                    let rules: Vec<Node> = child
                        .named_children(&mut inner_cursor)
                        .filter(|c| c.kind() == "block")
                        .flat_map(|block| {
                            let mut block_cursor = block.walk();
                            block
                                .named_children(&mut block_cursor)
                                .filter(|c| c.kind() == "rule_set")
                                .collect::<Vec<_>>()
                        })
                        .collect();
                    for rule in rules {
                        emit_rule(&mut builder, &file_name, &rule, source, query.as_deref());
                    }
                }
                _ => {}
            }
        }

        Ok(builder.finish())
    }
}

fn emit_rule(
    builder: &mut OutcomeBuilder,
    file_name: &str,
    rule: &Node,
    source: &[u8],
    media_query: Option<&str>,
) {
    let mut selectors_cursor = rule.walk();
    let Some(selectors) = rule.child_by_field_name("selectors").or_else(|| {
        rule.named_children(&mut selectors_cursor)
            .find(|c| c.kind() == "selectors")
    }) else {
        return;
    };
    let selector = normalize_selector(node_text(&selectors, source));
    if selector.is_empty() {
        return;
    }
    let span = node_span(rule);
    let candidate = builder.qualified(&[&selector]);
    let qualified = builder.unique_name(candidate, span.start);
    builder.contains(file_name.to_string(), qualified.clone());

    let signature = match media_query {
        Some(query) => format!("{} @media {}", selector, query),
        None => selector.clone(),
    };
    builder.add_entity(
        qualified,
        EntityType::Other("style_rule".to_string()),
        span,
        signature,
        EntityFacts::default(),
        Some(node_text(rule, source).to_string()),
    );
}

fn normalize_selector(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn import_target(node: &Node, source: &[u8]) -> String {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|c| matches!(c.kind(), "string_value" | "call_expression"))
        .map(|c| {
            node_text(&c, source)
                .trim_start_matches("url(")
                .trim_end_matches(')')
                .trim_matches(|ch| ch == '"' || ch == '\'')
                .to_string()
        })
        .unwrap_or_default();
    found
}

fn media_query(node: &Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let query = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "block")
        .map(|c| node_text(&c, source).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    if query.is_empty() {
        None
    } else {
        Some(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_become_selector_entities() {
        let source = r#"@import "reset.css";

.sidebar a:hover {
  color: red;
}

@media (max-width: 600px) {
  .sidebar {
    display: none;
  }
}
"#;
        let outcome = CssParser::new()
            .parse(source.as_bytes(), Path::new("/web/site.css"))
            .unwrap();

        assert!(outcome
            .entities
            .iter()
            .any(|e| e.name == "site::.sidebar a:hover"));
        assert!(outcome.entities.iter().any(|e| e.name == "site::.sidebar"));
        assert!(outcome.relations.iter().any(|r| {
            r.to_entity == "reset.css" && r.relation_type == RelationType::Imports
        }));
        // File + 2 rules, each rule with an implementation chunk.
        assert_eq!(outcome.implementation_chunks().count(), 2);
    }

    #[test]
    fn duplicate_selectors_disambiguate() {
        let source = ".btn { color: red; }\n.btn { color: blue; }\n";
        let outcome = CssParser::new()
            .parse(source.as_bytes(), Path::new("/web/btn.css"))
            .unwrap();
        let names: Vec<&str> = outcome
            .entities
            .iter()
            .filter(|e| e.entity_type != EntityType::File)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["btn::.btn", "btn::.btn#2"]);
    }
}
