pub mod ini;
pub mod markdown;
pub mod plain;

pub use ini::IniParser;
pub use markdown::MarkdownParser;
pub use plain::PlainTextParser;

use codemem_core::LineSpan;

/// A sized slice of free text with its line range.
#[derive(Debug, Clone)]
pub struct TextPiece {
    pub content: String,
    pub span: LineSpan,
}

/// Split text into pieces of roughly `target_bytes`, breaking at line
/// boundaries so no line is ever split mid-way.
pub fn chunk_text(text: &str, target_bytes: usize) -> Vec<TextPiece> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut start_line = 1u32;
    let mut line_no = 0u32;

    for line in text.lines() {
        line_no += 1;
        if current.is_empty() {
            start_line = line_no;
        }
        current.push_str(line);
        current.push('\n');
        if current.len() >= target_bytes {
            pieces.push(TextPiece {
                content: std::mem::take(&mut current),
                span: LineSpan::new(start_line, line_no),
            });
        }
    }
    if !current.trim().is_empty() {
        pieces.push(TextPiece {
            content: current,
            span: LineSpan::new(start_line, line_no.max(start_line)),
        });
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_break_at_line_boundaries() {
        let text = "one\ntwo\nthree\nfour\n";
        let pieces = chunk_text(text, 8);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.content.ends_with('\n'));
        }
        let rejoined: String = pieces.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("   \n  \n", 100).is_empty());
    }
}
