use crate::languages::util::{count_lines, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use crate::text::chunk_text;
use codemem_core::{EntityType, IndexError, Result};
use std::path::Path;

const CHUNK_TARGET_BYTES: usize = 1500;

/// Free text split into sized chunks. No implementation chunks: the chunk
/// text itself is the embedded unit.
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for PlainTextParser {
    fn language(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text", "rst", "log"]
    }

    fn emits_implementation(&self) -> bool {
        false
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = String::from_utf8_lossy(source);
        if text.contains('\u{FFFD}') {
            return Err(IndexError::Parse {
                file: file_path.display().to_string(),
                detail: "binary or non-UTF-8 content".to_string(),
            });
        }

        let mut builder = OutcomeBuilder::new(file_path);
        let file_name = builder.file_entity(count_lines(&text), None);

        for (index, piece) in chunk_text(&text, CHUNK_TARGET_BYTES).into_iter().enumerate() {
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

        Ok(builder.finish())
    }
}
