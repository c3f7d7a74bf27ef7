// ABOUTME: Header-delimited document parsing for Markdown prose
// ABOUTME: Each section becomes a documentation entity with its own chunks

use crate::languages::util::{count_lines, OutcomeBuilder};
use crate::observations::{first_sentence, EntityFacts};
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, LineSpan, Result};
use std::path::Path;

/// Sections shorter than this embed whole in the metadata chunk; longer
/// ones get a separate implementation chunk.
const IMPLEMENTATION_MIN_BYTES: usize = 400;

pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

struct Section {
    title: String,
    level: usize,
    start_line: u32,
    end_line: u32,
    body: String,
}

impl SourceParser for MarkdownParser {
    fn language(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(source).map_err(|e| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;

        let sections = split_sections(text);
        let mut builder = OutcomeBuilder::new(file_path);

        let doc_summary = sections
            .iter()
            .find(|s| !s.body.trim().is_empty())
            .and_then(|s| first_sentence(s.body.trim()));
        let file_name = builder.file_entity(count_lines(text), doc_summary);

        for section in sections.iter().filter(|s| !s.title.is_empty()) {
            let slug = slugify(&section.title);
            let candidate = builder.qualified(&[&slug]);
            let qualified = builder.unique_name(candidate, section.start_line);
            builder.contains(file_name.clone(), qualified.clone());

            let facts = EntityFacts {
                docstring: Some(section.body.clone()).filter(|b| !b.trim().is_empty()),
                ..EntityFacts::default()
            };
            let signature = format!("{} {}", "#".repeat(section.level), section.title);
            let full = format!("{}\n{}", signature, section.body);
            let implementation =
                (section.body.len() >= IMPLEMENTATION_MIN_BYTES).then_some(full);

            builder.add_entity(
                qualified,
                EntityType::Documentation,
                LineSpan::new(section.start_line, section.end_line),
                signature,
                facts,
                implementation,
            );
        }

        Ok(builder.finish())
    }
}

/// Split on ATX headers. A leading headerless preamble becomes a section
/// with an empty title so its text can still seed the file summary.
fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section {
        title: String::new(),
        level: 0,
        start_line: 1,
        end_line: 1,
        body: String::new(),
    };
    let mut in_fence = false;

    for (index, line) in text.lines().enumerate() {
        let line_no = index as u32 + 1;
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let header_level = if in_fence {
            0
        } else {
            header_level_of(line)
        };
        if header_level > 0 {
            current.end_line = line_no.saturating_sub(1).max(current.start_line);
            sections.push(current);
            current = Section {
                title: line.trim_start_matches('#').trim().to_string(),
                level: header_level,
                start_line: line_no,
                end_line: line_no,
                body: String::new(),
            };
        } else {
            current.body.push_str(line);
            current.body.push('\n');
            current.end_line = line_no;
        }
    }
    sections.push(current);
    sections
}

fn header_level_of(line: &str) -> usize {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes > 0 && hashes <= 6 && trimmed.chars().nth(hashes).map_or(true, |c| c == ' ') {
        hashes
    } else {
        0
    }
}

fn slugify(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"Project overview paragraph. It explains the tool.

# Install

Run the installer.

# Usage

Long usage text here that goes on and on, repeated to cross the chunk
threshold for implementation storage. Lorem ipsum details about flags and
modes and configuration and environment variables and troubleshooting and
more flags and more modes and more configuration keys and more everything,
until this section is comfortably longer than four hundred bytes of prose
so that the parser decides the body deserves its own implementation chunk.

## Flags

Short list.
"#;

    #[test]
    fn sections_become_documentation_entities() {
        let outcome = MarkdownParser::new()
            .parse(SAMPLE.as_bytes(), Path::new("/docs/README.md"))
            .unwrap();
        let names: Vec<&str> = outcome
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Documentation)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["README::install", "README::usage", "README::flags"]
        );
    }

    #[test]
    fn file_summary_comes_from_preamble() {
        let outcome = MarkdownParser::new()
            .parse(SAMPLE.as_bytes(), Path::new("/docs/README.md"))
            .unwrap();
        assert!(outcome.entities[0]
            .observations
            .contains(&"purpose:Project overview paragraph.".to_string()));
    }

    #[test]
    fn only_long_sections_get_implementation_chunks() {
        let outcome = MarkdownParser::new()
            .parse(SAMPLE.as_bytes(), Path::new("/docs/README.md"))
            .unwrap();
        let impl_entities: Vec<&str> = outcome
            .implementation_chunks()
            .map(|c| c.entity_name.as_str())
            .collect();
        assert_eq!(impl_entities, vec!["README::usage"]);
        let install = outcome
            .metadata_chunks()
            .find(|c| c.entity_name == "README::install")
            .unwrap();
        assert!(!install.has_implementation);
    }

    #[test]
    fn headers_inside_code_fences_are_ignored() {
        let text = "# Real\n\n```\n# not a header\n```\n";
        let outcome = MarkdownParser::new()
            .parse(text.as_bytes(), Path::new("/docs/x.md"))
            .unwrap();
        let docs = outcome
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Documentation)
            .count();
        assert_eq!(docs, 1);
    }
}
