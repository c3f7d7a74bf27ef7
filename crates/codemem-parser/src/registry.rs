// ABOUTME: Extension-keyed parser registry and the uniform extraction contract
// ABOUTME: First registration of an extension wins; lookup is case-folded

use codemem_core::{Chunk, Entity, IndexError, Relation, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::languages::{
    CssParser, EcmaDialect, EcmaParser, HtmlParser, JsonParser, PythonParser, YamlParser,
};
use crate::text::{IniParser, MarkdownParser, PlainTextParser};

/// Everything a single file parse produces.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub chunks: Vec<Chunk>,
    pub diagnostics: Vec<String>,
    pub streamed: bool,
}

impl ParseOutcome {
    pub fn metadata_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.kind == codemem_core::ChunkKind::Metadata)
    }

    pub fn implementation_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.kind == codemem_core::ChunkKind::Implementation)
    }
}

/// Uniform contract all language and text parsers implement. Parsers are
/// CPU-bound and synchronous; callers wrap them in `spawn_blocking`.
pub trait SourceParser: Send + Sync {
    fn language(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];

    /// Whether very large inputs take a bounded-memory pathway.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether this parser emits implementation chunks at all.
    fn emits_implementation(&self) -> bool {
        true
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome>;
}

impl std::fmt::Debug for dyn SourceParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceParser({})", self.language())
    }
}

pub struct ParserRegistry {
    parsers: Vec<Arc<dyn SourceParser>>,
    by_extension: HashMap<String, usize>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in parser. `streaming_threshold` is the
    /// byte size beyond which structured files switch to the streaming
    /// pathway.
    pub fn with_default_parsers(streaming_threshold: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonParser::new()));
        registry.register(Arc::new(EcmaParser::new(EcmaDialect::JavaScript)));
        registry.register(Arc::new(EcmaParser::new(EcmaDialect::TypeScript)));
        registry.register(Arc::new(CssParser::new()));
        registry.register(Arc::new(HtmlParser::new()));
        registry.register(Arc::new(YamlParser::new()));
        registry.register(Arc::new(JsonParser::new(streaming_threshold)));
        registry.register(Arc::new(MarkdownParser::new()));
        registry.register(Arc::new(IniParser::new()));
        registry.register(Arc::new(PlainTextParser::new()));
        registry
    }

    /// Later registrations never steal an extension already claimed.
    pub fn register(&mut self, parser: Arc<dyn SourceParser>) {
        let slot = self.parsers.len();
        for ext in parser.extensions() {
            self.by_extension
                .entry(ext.to_ascii_lowercase())
                .or_insert(slot);
        }
        self.parsers.push(parser);
    }

    pub fn parser_for(&self, file_path: &Path) -> Result<Arc<dyn SourceParser>> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        self.by_extension
            .get(&ext)
            .map(|&slot| Arc::clone(&self.parsers[slot]))
            .ok_or(IndexError::UnsupportedLanguage(ext))
    }

    pub fn supports(&self, file_path: &Path) -> bool {
        self.parser_for(file_path).is_ok()
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }

    pub fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        self.parser_for(file_path)?.parse(source, file_path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_default_parsers(2 * 1_048_576)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_unsupported() {
        let registry = ParserRegistry::default();
        let err = registry.parser_for(Path::new("core.zig")).unwrap_err();
        match err {
            IndexError::UnsupportedLanguage(ext) => assert_eq!(ext, "zig"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extension_lookup_is_case_folded() {
        let registry = ParserRegistry::default();
        assert!(registry.supports(Path::new("Main.PY")));
        assert!(registry.supports(Path::new("index.Ts")));
    }

    #[test]
    fn first_registration_wins() {
        struct Fake(&'static str);
        impl SourceParser for Fake {
            fn language(&self) -> &'static str {
                self.0
            }
            fn extensions(&self) -> &'static [&'static str] {
                &["py"]
            }
            fn parse(&self, _: &[u8], _: &Path) -> Result<ParseOutcome> {
                Ok(ParseOutcome::default())
            }
        }

        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(Fake("first")));
        registry.register(Arc::new(Fake("second")));
        let parser = registry.parser_for(Path::new("a.py")).unwrap();
        assert_eq!(parser.language(), "first");
    }

    #[test]
    fn default_registry_covers_required_extensions() {
        let registry = ParserRegistry::default();
        for ext in [
            "py", "js", "jsx", "ts", "tsx", "css", "html", "yaml", "yml", "json", "md", "ini",
            "txt",
        ] {
            assert!(
                registry.supports(Path::new(&format!("f.{ext}"))),
                "missing parser for .{ext}"
            );
        }
    }
}
