use crate::languages::util::{count_lines, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, LineSpan, Result};
use std::path::Path;

/// Line-oriented config: `[section]` headers become entities, their keys
/// ride along as observations.
pub struct IniParser;

impl IniParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IniParser {
    fn default() -> Self {
        Self::new()
    }
}

struct IniSection {
    name: String,
    start_line: u32,
    end_line: u32,
    keys: Vec<String>,
    body: String,
}

impl SourceParser for IniParser {
    fn language(&self) -> &'static str {
        "ini"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ini", "cfg", "conf", "toml"]
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(source).map_err(|e| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;

        let mut builder = OutcomeBuilder::new(file_path);
        let file_name = builder.file_entity(count_lines(text), None);

        let mut sections: Vec<IniSection> = Vec::new();
        let mut current: Option<IniSection> = None;

        for (index, line) in text.lines().enumerate() {
            let line_no = index as u32 + 1;
            let trimmed = line.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() > 2 {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(IniSection {
                    name: trimmed[1..trimmed.len() - 1].trim().to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    keys: Vec::new(),
                    body: String::new(),
                });
                continue;
            }
            if let Some(section) = current.as_mut() {
                section.body.push_str(line);
                section.body.push('\n');
                section.end_line = line_no;
                if trimmed.starts_with('#') || trimmed.starts_with(';') || trimmed.is_empty() {
                    continue;
                }
                if let Some(key) = trimmed.split(['=', ':']).next() {
                    let key = key.trim();
                    if !key.is_empty() {
                        section.keys.push(key.to_string());
                    }
                }
            }
        }
        if let Some(section) = current.take() {
            sections.push(section);
        }

        for section in sections {
            if section.name.is_empty() {
                continue;
            }
            let candidate = builder.qualified(&[&section.name]);
            let qualified = builder.unique_name(candidate, section.start_line);
            builder.contains(file_name.clone(), qualified.clone());

            let facts = EntityFacts {
                params: Some(section.keys.len()),
                ..EntityFacts::default()
            };
            let signature = format!("[{}] {}", section.name, section.keys.join(", "));
            let implementation = (!section.body.trim().is_empty())
                .then(|| format!("[{}]\n{}", section.name, section.body));
            builder.add_entity(
                qualified,
                EntityType::Other("section".to_string()),
                LineSpan::new(section.start_line, section.end_line),
                signature,
                facts,
                implementation,
            );
        }

        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"; server config
[server]
host = localhost
port = 6334

[auth]
token = secret
"#;

    #[test]
    fn sections_become_entities_with_key_counts() {
        let outcome = IniParser::new()
            .parse(SAMPLE.as_bytes(), Path::new("/etc/app.ini"))
            .unwrap();
        let server = outcome
            .entities
            .iter()
            .find(|e| e.name == "app::server")
            .unwrap();
        assert!(server.observations.contains(&"params:2".to_string()));
        assert!(outcome.entities.iter().any(|e| e.name == "app::auth"));
    }

    #[test]
    fn section_bodies_land_in_implementation_chunks() {
        let outcome = IniParser::new()
            .parse(SAMPLE.as_bytes(), Path::new("/etc/app.ini"))
            .unwrap();
        let imp = outcome
            .implementation_chunks()
            .find(|c| c.entity_name == "app::server")
            .unwrap();
        assert!(imp.content.contains("host = localhost"));
    }

    #[test]
    fn preamble_without_section_is_ignored() {
        let outcome = IniParser::new()
            .parse(b"stray = value\n", Path::new("/etc/bare.ini"))
            .unwrap();
        assert_eq!(outcome.entities.len(), 1, "only the file entity");
    }
}
