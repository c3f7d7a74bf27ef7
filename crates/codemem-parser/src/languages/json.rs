// ABOUTME: JSON extraction with a bounded-memory pathway for very large files
// ABOUTME: Small files walk the grammar; oversized ones degrade to text chunks

use crate::languages::util::{count_lines, node_span, node_text, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use crate::text::chunk_text;
use codemem_core::{EntityType, IndexError, Result};
use std::path::Path;
use tree_sitter::Node;

pub struct JsonParser {
    language: tree_sitter::Language,
    streaming_threshold: u64,
}

impl JsonParser {
    pub fn new(streaming_threshold: u64) -> Self {
        Self {
            language: tree_sitter_json::LANGUAGE.into(),
            streaming_threshold,
        }
    }

    /// Bounded-memory pathway: no tree, just the file entity plus sized
    /// text chunks.
    fn parse_streamed(&self, text: &str, file_path: &Path) -> ParseOutcome {
        let mut builder = OutcomeBuilder::new(file_path);
        let file_name = builder.file_entity(count_lines(text), None);

        for (index, piece) in chunk_text(text, 4096).into_iter().enumerate() {
            let name = format!("{}::chunk_{}", builder.module(), index);
            let qualified = builder.unique_name(name, piece.span.start);
            builder.contains(file_name.clone(), qualified.clone());
            builder.add_entity(
                qualified,
                EntityType::TextChunk,
                piece.span,
                piece.content,
                EntityFacts::default(),
                None,
            );
        }
        builder.mark_streamed();
        builder.finish()
    }
}

impl SourceParser for JsonParser {
    fn language(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(source).map_err(|e| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;

        if source.len() as u64 > self.streaming_threshold {
            return Ok(self.parse_streamed(text, file_path));
        }

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

        // Top-level object keys only; arrays and scalars produce just the
        // file entity.
        let root = tree.root_node();
        if let Some(object) = first_of_kind(&root, "object") {
            let mut cursor = object.walk();
            let pairs: Vec<Node> = object
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "pair")
                .collect();
            for pair in pairs {
                emit_pair(&mut builder, &file_name, &pair, source);
            }
        }

        Ok(builder.finish())
    }
}

fn first_of_kind<'t>(root: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    if root.kind() == kind {
        return Some(*root);
    }
    let mut cursor = root.walk();
    let children: Vec<Node> = root.named_children(&mut cursor).collect();
    for child in children {
        if child.kind() == kind {
            return Some(child);
        }
    }
    None
}

fn emit_pair(builder: &mut OutcomeBuilder, file_name: &str, pair: &Node, source: &[u8]) {
    let Some(key) = pair.child_by_field_name("key") else {
        return;
    };
    let key_text = node_text(&key, source).trim_matches('"').to_string();
    if key_text.is_empty() {
        return;
    }
    let span = node_span(pair);
    let candidate = builder.qualified(&[&key_text]);
    let qualified = builder.unique_name(candidate, span.start);
    builder.contains(file_name.to_string(), qualified.clone());

    let value = pair.child_by_field_name("value");
    let compound = value
        .map(|v| matches!(v.kind(), "object" | "array"))
        .unwrap_or(false);
    let pair_text = node_text(pair, source).to_string();
    let signature = summarize_pair(&key_text, value.as_ref(), source);
    let implementation = if compound { Some(pair_text) } else { None };

    builder.add_entity(
        qualified,
        EntityType::Variable,
        span,
        signature,
        EntityFacts::default(),
        implementation,
    );
}

fn summarize_pair(key: &str, value: Option<&Node>, source: &[u8]) -> String {
    match value {
        Some(v) if v.kind() == "object" => format!("{}: {{...}} ({} keys)", key, v.named_child_count()),
        Some(v) if v.kind() == "array" => format!("{}: [...] ({} items)", key, v.named_child_count()),
        Some(v) => format!("{}: {}", key, node_text(v, source)),
        None => key.to_string(),
    }
}
