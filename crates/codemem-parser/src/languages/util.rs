// ABOUTME: Shared extraction plumbing used by every language parser
// ABOUTME: Qualified naming, collision handling, and chunk assembly in one place

use crate::observations::{render_observations, EntityFacts};
use crate::registry::ParseOutcome;
use codemem_core::{Chunk, Entity, EntityType, LineSpan, Relation, RelationType};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Node;

pub fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub fn node_span(node: &Node) -> LineSpan {
    LineSpan::new(
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

/// Whether any node in the tree is a tree-sitter ERROR node.
pub fn has_error_nodes(node: &Node) -> bool {
    if node.is_error() || node.kind() == "ERROR" {
        return true;
    }
    let mut cursor = node.walk();
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        if current.is_error() {
            return true;
        }
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    false
}

/// Accumulates entities, relations, and both chunk kinds for one file parse.
/// Owns the naming rules: nested qualification, `#line` suffixing on
/// collision, and `anon@file:line` synthetic names.
pub struct OutcomeBuilder {
    file_path: String,
    module: String,
    outcome: ParseOutcome,
    used_names: HashMap<String, u32>,
    relation_keys: HashSet<(String, String, RelationType)>,
}

impl OutcomeBuilder {
    pub fn new(file_path: &Path) -> Self {
        let module = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_string();
        Self {
            file_path: file_path.to_string_lossy().into_owned(),
            module,
            outcome: ParseOutcome::default(),
            used_names: HashMap::new(),
            relation_keys: HashSet::new(),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualified(&self, parts: &[&str]) -> String {
        let mut name = self.module.clone();
        for part in parts {
            name.push_str("::");
            name.push_str(part);
        }
        name
    }

    pub fn anon_name(&self, line: u32) -> String {
        format!("anon@{}:{}", self.module, line)
    }

    /// Resolve duplicate declarations in one scope: the suffix is appended
    /// only on collision, so ids stay stable when unrelated code moves.
    pub fn unique_name(&mut self, candidate: String, line: u32) -> String {
        match self.used_names.get(&candidate) {
            None => {
                self.used_names.insert(candidate.clone(), line);
                candidate
            }
            Some(_) => {
                let disambiguated = format!("{}#{}", candidate, line);
                self.used_names.insert(disambiguated.clone(), line);
                disambiguated
            }
        }
    }

    /// The file entity comes first and owns everything else in the file.
    /// Returns its name (the file path itself).
    pub fn file_entity(&mut self, total_lines: u32, doc: Option<String>) -> String {
        let entity = Entity::new(
            self.file_path.clone(),
            EntityType::File,
            self.file_path.clone(),
            LineSpan::new(1, total_lines.max(1)),
        );
        let facts = EntityFacts {
            docstring: doc,
            ..EntityFacts::default()
        };
        let observations = render_observations(&entity.name, &facts);
        let entity = entity.with_observations(observations.clone());

        let mut content = format!("file: {}", self.file_path);
        for tag in &observations {
            content.push('\n');
            content.push_str(tag);
        }
        self.outcome
            .chunks
            .push(Chunk::metadata(&entity, content, false));
        self.outcome.entities.insert(0, entity);
        self.file_path.clone()
    }

    /// Add an entity with its metadata chunk and, when a body exists, its
    /// implementation chunk.
    pub fn add_entity(
        &mut self,
        name: String,
        entity_type: EntityType,
        span: LineSpan,
        signature: String,
        facts: EntityFacts,
        implementation: Option<String>,
    ) {
        let observations = render_observations(&name, &facts);
        let entity = Entity::new(name, entity_type, self.file_path.clone(), span)
            .with_observations(observations.clone());

        let mut content = signature;
        for tag in &observations {
            content.push('\n');
            content.push_str(tag);
        }
        let has_implementation = implementation.is_some();
        self.outcome
            .chunks
            .push(Chunk::metadata(&entity, content, has_implementation));
        if let Some(body) = implementation {
            self.outcome.chunks.push(Chunk::implementation(&entity, body));
        }
        self.outcome.entities.push(entity);
    }

    /// Relations are deduplicated on `(from, to, type)`; the owning file is
    /// implied by the builder.
    pub fn relation<F: Into<String>, T: Into<String>>(
        &mut self,
        from: F,
        to: T,
        relation_type: RelationType,
    ) {
        let from = from.into();
        let to = to.into();
        if from == to {
            return;
        }
        let key = (from.clone(), to.clone(), relation_type.clone());
        if self.relation_keys.insert(key) {
            self.outcome.relations.push(Relation::new(
                from,
                to,
                relation_type,
                self.file_path.clone(),
            ));
        }
    }

    pub fn contains<F: Into<String>, T: Into<String>>(&mut self, parent: F, child: T) {
        self.relation(parent, child, RelationType::Contains);
    }

    pub fn diagnostic<S: Into<String>>(&mut self, message: S) {
        self.outcome.diagnostics.push(message.into());
    }

    pub fn mark_streamed(&mut self) {
        self.outcome.streamed = true;
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.outcome.entities.iter().map(|e| e.name.as_str())
    }

    pub fn finish(self) -> ParseOutcome {
        self.outcome
    }
}

pub fn count_lines(source: &str) -> u32 {
    source.lines().count() as u32
}
