use crate::languages::util::{count_lines, node_span, node_text, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, RelationType, Result};
use std::path::Path;
use tree_sitter::Node;

/// Document-structure extraction: identified elements become entities,
/// script/link references become relations, the title seeds the doc summary.
pub struct HtmlParser {
    language: tree_sitter::Language,
}

impl HtmlParser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_html::LANGUAGE.into(),
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for HtmlParser {
    fn language(&self) -> &'static str {
        "html"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
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
        let root = tree.root_node();
        let title = find_title(&root, source);
        let file_name = builder.file_entity(count_lines(text), title);

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if matches!(node.kind(), "element" | "script_element" | "style_element") {
                visit_element(&mut builder, &file_name, &node, source);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }

        Ok(builder.finish())
    }
}

fn visit_element(builder: &mut OutcomeBuilder, file_name: &str, element: &Node, source: &[u8]) {
    let Some(tag) = start_tag(element) else {
        return;
    };
    let tag_name = tag
        .child_by_field_name("name")
        .map(|n| node_text(&n, source).to_ascii_lowercase())
        .unwrap_or_default();

    match tag_name.as_str() {
        "script" => {
            if let Some(src) = attribute_value(&tag, "src", source) {
                builder.relation(file_name.to_string(), src, RelationType::Imports);
            }
        }
        "link" => {
            if let Some(href) = attribute_value(&tag, "href", source) {
                builder.relation(file_name.to_string(), href, RelationType::References);
            }
        }
        "a" => {
            if let Some(href) = attribute_value(&tag, "href", source) {
                if !href.starts_with('#') {
                    builder.relation(file_name.to_string(), href, RelationType::References);
                }
            }
        }
        _ => {}
    }

    if let Some(id) = attribute_value(&tag, "id", source) {
        let span = node_span(element);
        let display = format!("{}#{}", tag_name, id);
        let candidate = builder.qualified(&[&display]);
        let qualified = builder.unique_name(candidate, span.start);
        builder.contains(file_name.to_string(), qualified.clone());
        builder.add_entity(
            qualified,
            EntityType::Other("element".to_string()),
            span,
            format!("<{} id=\"{}\">", tag_name, id),
            EntityFacts::default(),
            Some(node_text(element, source).to_string()),
        );
    }
}

fn start_tag<'t>(element: &Node<'t>) -> Option<Node<'t>> {
    let mut cursor = element.walk();
    let found = element
        .children(&mut cursor)
        .find(|c| matches!(c.kind(), "start_tag" | "self_closing_tag"));
    found
}

fn attribute_value(tag: &Node, wanted: &str, source: &[u8]) -> Option<String> {
    let mut cursor = tag.walk();
    for attribute in tag.named_children(&mut cursor) {
        if attribute.kind() != "attribute" {
            continue;
        }
        let name = attribute
            .named_child(0)
            .map(|n| node_text(&n, source).to_ascii_lowercase())
            .unwrap_or_default();
        if name != wanted {
            continue;
        }
        let value = attribute
            .named_child(1)
            .map(|n| node_text(&n, source).trim_matches('"').trim_matches('\'').to_string())?;
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

fn find_title(root: &Node, source: &[u8]) -> Option<String> {
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.kind() == "element" {
            if let Some(tag) = start_tag(&node) {
                let name = tag
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_ascii_lowercase())
                    .unwrap_or_default();
                if name == "title" {
                    let mut cursor = node.walk();
                    let text = node
                        .named_children(&mut cursor)
                        .find(|c| c.kind() == "text")
                        .map(|t| node_text(&t, source).trim().to_string())?;
                    if !text.is_empty() {
                        return Some(text);
                    }
                    return None;
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    None
}
