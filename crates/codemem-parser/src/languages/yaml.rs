use crate::languages::util::{count_lines, node_span, node_text, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, Result};
use std::path::Path;
use tree_sitter::Node;

/// Key-value tree extraction: top-level mapping keys become variable
/// entities; nested values travel in the implementation chunk.
pub struct YamlParser {
    language: tree_sitter::Language,
}

impl YamlParser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_yaml::LANGUAGE.into(),
        }
    }
}

impl Default for YamlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for YamlParser {
    fn language(&self) -> &'static str {
        "yaml"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["yaml", "yml"]
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

        // Mapping pairs at document depth; deeper nesting stays inside the
        // top-level pair's implementation chunk.
        let mut stack = vec![tree.root_node()];
        let mut pairs = Vec::new();
        while let Some(node) = stack.pop() {
            if node.kind() == "block_mapping_pair" {
                pairs.push(node);
                continue;
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
        pairs.sort_by_key(|p| p.start_byte());

        for pair in pairs {
            emit_pair(&mut builder, &file_name, &pair, source);
        }

        Ok(builder.finish())
    }
}

fn emit_pair(builder: &mut OutcomeBuilder, file_name: &str, pair: &Node, source: &[u8]) {
    let Some(key) = pair.child_by_field_name("key") else {
        return;
    };
    let key_text = node_text(&key, source).trim().to_string();
    if key_text.is_empty() {
        return;
    }
    let span = node_span(pair);
    let candidate = builder.qualified(&[&key_text]);
    let qualified = builder.unique_name(candidate, span.start);
    builder.contains(file_name.to_string(), qualified.clone());

    let value = pair.child_by_field_name("value");
    let scalar = value
        .map(|v| is_scalar(&v))
        .unwrap_or(true);
    let pair_text = node_text(pair, source).to_string();
    let signature = first_line(&pair_text);

    let implementation = if scalar { None } else { Some(pair_text) };
    builder.add_entity(
        qualified,
        EntityType::Variable,
        span,
        signature,
        EntityFacts::default(),
        implementation,
    );
}

fn is_scalar(value: &Node) -> bool {
    let mut stack = vec![*value];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "block_mapping" | "block_sequence" | "flow_mapping" | "flow_sequence" => {
                return false
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    true
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_keys_become_entities() {
        let source = r#"name: codemem
server:
  host: localhost
  port: 6334
tags:
  - alpha
  - beta
"#;
        let outcome = YamlParser::new()
            .parse(source.as_bytes(), Path::new("/repo/config.yaml"))
            .unwrap();
        let names: Vec<&str> = outcome
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Variable)
            .map(|e| e.name.as_str())
            .collect();
        assert!(names.contains(&"config::name"));
        assert!(names.contains(&"config::server"));
        assert!(names.contains(&"config::tags"));
        // `server.host` stays nested inside server's implementation chunk.
        assert!(!names.iter().any(|n| n.contains("host")));
    }

    #[test]
    fn scalar_values_get_no_implementation_chunk() {
        let source = "name: codemem\nserver:\n  host: localhost\n";
        let outcome = YamlParser::new()
            .parse(source.as_bytes(), Path::new("/repo/config.yaml"))
            .unwrap();
        let name_meta = outcome
            .metadata_chunks()
            .find(|c| c.entity_name == "config::name")
            .unwrap();
        assert!(!name_meta.has_implementation);
        let server_meta = outcome
            .metadata_chunks()
            .find(|c| c.entity_name == "config::server")
            .unwrap();
        assert!(server_meta.has_implementation);
    }
}
