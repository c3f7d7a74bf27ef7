// ABOUTME: Python extraction: entities, relations, and progressive-disclosure chunks
// ABOUTME: Grammar-driven walk over the tree-sitter CST, best-effort in-file name resolution

use crate::complexity::decision_points;
use crate::languages::util::{
    count_lines, has_error_nodes, node_span, node_text, OutcomeBuilder,
};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, RelationType, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Node;

pub struct PythonParser {
    language: tree_sitter::Language,
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
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

        let root = tree.root_node();
        let mut extractor = PyExtractor::new(source, file_path);
        if has_error_nodes(&root) {
            extractor
                .builder
                .diagnostic(format!("syntax errors in {}", file_path.display()));
        }

        extractor.collect_declared_names(&root);
        let module_doc = docstring_of_block(&root, source);
        let file_name = extractor
            .builder
            .file_entity(count_lines(text), module_doc);
        extractor.file_name = file_name;
        extractor.walk_module(&root);

        Ok(extractor.builder.finish())
    }
}

struct PyExtractor<'s> {
    source: &'s [u8],
    builder: OutcomeBuilder,
    file_name: String,
    /// Simple declared name -> qualified name, for call resolution in file scope.
    declared: HashMap<String, String>,
    class_names: HashSet<String>,
}

impl<'s> PyExtractor<'s> {
    fn new(source: &'s [u8], file_path: &Path) -> Self {
        Self {
            source,
            builder: OutcomeBuilder::new(file_path),
            file_name: String::new(),
            declared: HashMap::new(),
            class_names: HashSet::new(),
        }
    }

    /// Pre-pass so forward references resolve: records every def/class name
    /// and from-imported symbol before entities are emitted.
    fn collect_declared_names(&mut self, root: &Node) {
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let node = definition_of(&child);
            match node.kind() {
                "import_from_statement" => {
                    let module = node
                        .child_by_field_name("module_name")
                        .map(|n| node_text(&n, self.source).to_string())
                        .unwrap_or_default();
                    let module_path = module.trim_start_matches('.').replace('.', "::");
                    if module_path.is_empty() {
                        continue;
                    }
                    let mut item_cursor = node.walk();
                    for item in node.named_children(&mut item_cursor) {
                        if node
                            .child_by_field_name("module_name")
                            .map(|m| m.id() == item.id())
                            .unwrap_or(false)
                        {
                            continue;
                        }
                        let (binding, original) = match item.kind() {
                            "dotted_name" => {
                                let name = node_text(&item, self.source).to_string();
                                (name.clone(), name)
                            }
                            "aliased_import" => {
                                let original = item
                                    .child_by_field_name("name")
                                    .map(|n| node_text(&n, self.source).to_string())
                                    .unwrap_or_default();
                                let alias = item
                                    .child_by_field_name("alias")
                                    .map(|n| node_text(&n, self.source).to_string())
                                    .unwrap_or_else(|| original.clone());
                                (alias, original)
                            }
                            _ => continue,
                        };
                        if binding.is_empty() || binding.contains('.') {
                            continue;
                        }
                        let qualified = format!("{}::{}", module_path, original);
                        self.declared.entry(binding).or_insert(qualified);
                    }
                }
                "function_definition" => {
                    if let Some(name) = field_text(&node, "name", self.source) {
                        let qualified = self.builder.qualified(&[&name]);
                        self.declared.entry(name).or_insert(qualified);
                    }
                }
                "class_definition" => {
                    if let Some(class_name) = field_text(&node, "name", self.source) {
                        let class_qualified = self.builder.qualified(&[&class_name]);
                        self.class_names.insert(class_name.clone());
                        if let Some(body) = node.child_by_field_name("body") {
                            let mut body_cursor = body.walk();
                            for stmt in body.named_children(&mut body_cursor) {
                                let method = definition_of(&stmt);
                                if method.kind() == "function_definition" {
                                    if let Some(m) = field_text(&method, "name", self.source) {
                                        let qualified =
                                            self.builder.qualified(&[&class_name, &m]);
                                        self.declared.entry(m).or_insert(qualified);
                                    }
                                }
                            }
                        }
                        self.declared.entry(class_name).or_insert(class_qualified);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_module(&mut self, root: &Node) {
        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "decorated_definition" => {
                    let decorators = decorator_names(&child, self.source);
                    let inner = definition_of(&child);
                    match inner.kind() {
                        "function_definition" => {
                            self.emit_function(&inner, &child, &[], decorators, false)
                        }
                        "class_definition" => self.emit_class(&inner, &child, decorators),
                        _ => {}
                    }
                }
                "function_definition" => self.emit_function(&child, &child, &[], vec![], false),
                "class_definition" => self.emit_class(&child, &child, vec![]),
                "expression_statement" => self.emit_module_assignment(&child),
                "import_statement" => self.emit_import(&child),
                "import_from_statement" => self.emit_import_from(&child),
                _ => {}
            }
        }
    }

    /// `outer` is the decorated wrapper when present; its text and span are
    /// what lands in the implementation chunk.
    fn emit_function(
        &mut self,
        node: &Node,
        outer: &Node,
        scope: &[&str],
        decorators: Vec<String>,
        is_method: bool,
    ) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let mut parts: Vec<&str> = scope.to_vec();
        parts.push(&name);
        let candidate = self.builder.qualified(&parts);
        let span = node_span(outer);
        let qualified = self.builder.unique_name(candidate, span.start);

        let params_node = node.child_by_field_name("parameters");
        let params_text = params_node
            .map(|p| node_text(&p, self.source).to_string())
            .unwrap_or_else(|| "()".to_string());
        let return_annotation = field_text(node, "return_type", self.source);
        let is_async = node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);

        let body = node.child_by_field_name("body");
        let mut facts = EntityFacts {
            docstring: body.as_ref().and_then(|b| docstring_of_block(b, self.source)),
            params: params_node.map(|p| count_params(&p, self.source)),
            returns: return_annotation.clone(),
            is_async: Some(is_async),
            decorators: decorators.clone(),
            ..EntityFacts::default()
        };

        if let Some(body) = body {
            facts.complexity_score = Some(decision_points(&body, self.source));
            self.collect_body_relations(&body, &qualified, &mut facts);
            if facts.returns.is_none() && returns_value(&body) {
                facts.returns = Some("unknown".to_string());
            }
        }

        for decorator in &decorators {
            self.builder
                .relation(decorator.clone(), qualified.clone(), RelationType::Decorates);
        }

        let parent = if scope.is_empty() {
            self.file_name.clone()
        } else {
            self.builder.qualified(scope)
        };
        self.builder.contains(parent, qualified.clone());

        let mut signature = String::new();
        if is_async {
            signature.push_str("async ");
        }
        signature.push_str("def ");
        signature.push_str(&name);
        signature.push_str(&params_text);
        if let Some(ret) = &return_annotation {
            signature.push_str(" -> ");
            signature.push_str(ret);
        }

        let entity_type = if is_method {
            EntityType::Method
        } else {
            EntityType::Function
        };
        let implementation = node_text(outer, self.source).to_string();
        self.builder.add_entity(
            qualified.clone(),
            entity_type,
            span,
            signature,
            facts,
            Some(implementation),
        );

        // Nested defs get their own entities, qualified through the parent.
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let nested: Vec<Node> = body
                .named_children(&mut cursor)
                .filter(|c| {
                    matches!(c.kind(), "function_definition" | "decorated_definition")
                })
                .collect();
            for inner in nested {
                let inner_decorators = decorator_names(&inner, self.source);
                let def = definition_of(&inner);
                if def.kind() == "function_definition" {
                    let mut nested_scope: Vec<&str> = scope.to_vec();
                    nested_scope.push(&name);
                    self.emit_function(&def, &inner, &nested_scope, inner_decorators, false);
                }
            }
        }
    }

    fn emit_class(&mut self, node: &Node, outer: &Node, decorators: Vec<String>) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let span = node_span(outer);
        let candidate = self.builder.qualified(&[&name]);
        let qualified = self.builder.unique_name(candidate, span.start);

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                let base_text = node_text(&base, self.source).to_string();
                if base_text.is_empty() {
                    continue;
                }
                let target = self
                    .declared
                    .get(&base_text)
                    .cloned()
                    .unwrap_or_else(|| base_text.clone());
                self.builder
                    .relation(qualified.clone(), target, RelationType::Inherits);
                bases.push(base_text);
            }
        }

        for decorator in &decorators {
            self.builder
                .relation(decorator.clone(), qualified.clone(), RelationType::Decorates);
        }
        self.builder.contains(self.file_name.clone(), qualified.clone());

        let body = node.child_by_field_name("body");
        let facts = EntityFacts {
            docstring: body.as_ref().and_then(|b| docstring_of_block(b, self.source)),
            decorators,
            ..EntityFacts::default()
        };

        let signature = if bases.is_empty() {
            format!("class {}", name)
        } else {
            format!("class {}({})", name, bases.join(", "))
        };
        let implementation = node_text(outer, self.source).to_string();
        self.builder.add_entity(
            qualified.clone(),
            EntityType::Class,
            span,
            signature,
            facts,
            Some(implementation),
        );

        if let Some(body) = body {
            let mut cursor = body.walk();
            let members: Vec<Node> = body.named_children(&mut cursor).collect();
            for member in members {
                let member_decorators = decorator_names(&member, self.source);
                let def = definition_of(&member);
                if def.kind() == "function_definition" {
                    self.emit_function(&def, &member, &[&name], member_decorators, true);
                }
            }
        }
    }

    fn emit_module_assignment(&mut self, statement: &Node) {
        let Some(assignment) = statement.named_child(0).filter(|n| n.kind() == "assignment")
        else {
            return;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = node_text(&left, self.source).to_string();
        let span = node_span(statement);
        let candidate = self.builder.qualified(&[&name]);
        let qualified = self.builder.unique_name(candidate, span.start);
        self.builder.contains(self.file_name.clone(), qualified.clone());

        let right = assignment.child_by_field_name("right");
        if let Some(lambda) = right.filter(|n| n.kind() == "lambda") {
            let facts = EntityFacts {
                params: lambda
                    .child_by_field_name("parameters")
                    .map(|p| count_params(&p, self.source)),
                is_async: Some(false),
                ..EntityFacts::default()
            };
            self.builder.add_entity(
                qualified,
                EntityType::Function,
                span,
                first_line(node_text(statement, self.source)),
                facts,
                Some(node_text(statement, self.source).to_string()),
            );
            return;
        }

        self.builder.add_entity(
            qualified,
            EntityType::Variable,
            span,
            first_line(node_text(statement, self.source)),
            EntityFacts::default(),
            None,
        );
    }

    fn emit_import(&mut self, node: &Node) {
        let mut cursor = node.walk();
        for item in node.named_children(&mut cursor) {
            let target = match item.kind() {
                "dotted_name" => node_text(&item, self.source).to_string(),
                "aliased_import" => item
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, self.source).to_string())
                    .unwrap_or_default(),
                _ => continue,
            };
            if !target.is_empty() {
                self.builder
                    .relation(self.file_name.clone(), target, RelationType::Imports);
            }
        }
    }

    fn emit_import_from(&mut self, node: &Node) {
        let module = node
            .child_by_field_name("module_name")
            .map(|n| node_text(&n, self.source).to_string())
            .unwrap_or_default();
        let module_path = module.trim_start_matches('.').replace('.', "::");

        let mut cursor = node.walk();
        let mut imported_any = false;
        for item in node.named_children(&mut cursor) {
            if node
                .child_by_field_name("module_name")
                .map(|m| m.id() == item.id())
                .unwrap_or(false)
            {
                continue;
            }
            let symbol = match item.kind() {
                "dotted_name" => node_text(&item, self.source).to_string(),
                "aliased_import" => item
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, self.source).to_string())
                    .unwrap_or_default(),
                "wildcard_import" => "*".to_string(),
                _ => continue,
            };
            if symbol.is_empty() {
                continue;
            }
            imported_any = true;
            let target = if module_path.is_empty() {
                symbol
            } else {
                format!("{}::{}", module_path, symbol)
            };
            self.builder
                .relation(self.file_name.clone(), target, RelationType::Imports);
        }
        if !imported_any && !module_path.is_empty() {
            self.builder
                .relation(self.file_name.clone(), module_path, RelationType::Imports);
        }
    }

    /// Call sites, raises, catches, and file operations inside one body.
    /// Nested definitions are skipped; they collect their own.
    fn collect_body_relations(&mut self, body: &Node, owner: &str, facts: &mut EntityFacts) {
        let mut stack = vec![*body];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "function_definition" | "class_definition" if node.id() != body.id() => continue,
                "call" => {
                    self.emit_call(&node, owner, facts);
                }
                "raise_statement" => {
                    if let Some(raised) = exception_name(&node, self.source) {
                        facts.raises.push(raised.clone());
                        self.builder
                            .relation(owner.to_string(), raised, RelationType::Raises);
                    }
                }
                "except_clause" => {
                    if let Some(caught) = caught_exception(&node, self.source) {
                        facts.catches.push(caught.clone());
                        self.builder
                            .relation(owner.to_string(), caught, RelationType::Catches);
                    }
                }
                _ => {}
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if matches!(child.kind(), "function_definition" | "class_definition") {
                    continue;
                }
                stack.push(child);
            }
        }
    }

    fn emit_call(&mut self, call: &Node, owner: &str, facts: &mut EntityFacts) {
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        let callee_full = node_text(&function, self.source).to_string();
        if callee_full.is_empty() {
            return;
        }
        let simple = callee_full.rsplit('.').next().unwrap_or(&callee_full);

        if callee_full == "open" {
            self.emit_file_operation(call, owner);
        }

        facts.calls.push(callee_full.clone());

        // Resolution stays inside the file: plain identifiers and `self.`
        // method calls; dotted externals keep the raw callee string.
        let resolvable = !callee_full.contains('.') || callee_full.starts_with("self.");
        let resolved = if resolvable {
            self.declared
                .get(simple)
                .cloned()
                .unwrap_or_else(|| callee_full.clone())
        } else {
            callee_full.clone()
        };
        let is_constructor = resolvable
            && (self.class_names.contains(simple)
                || simple.chars().next().map(char::is_uppercase).unwrap_or(false));
        let relation_type = if is_constructor {
            RelationType::Instantiates
        } else {
            RelationType::Calls
        };
        self.builder.relation(owner.to_string(), resolved, relation_type);
    }

    /// `open(path, mode)` becomes a reads or writes relation when the path
    /// is a literal.
    fn emit_file_operation(&mut self, call: &Node, owner: &str) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = arguments.walk();
        let args: Vec<Node> = arguments.named_children(&mut cursor).collect();
        let Some(path_literal) = args.first().filter(|a| a.kind() == "string") else {
            return;
        };
        let target = strip_string_quotes(node_text(path_literal, self.source));
        if target.is_empty() {
            return;
        }
        let mode = args
            .get(1)
            .filter(|a| a.kind() == "string")
            .map(|a| strip_string_quotes(node_text(a, self.source)))
            .unwrap_or_default();
        let relation_type = if mode.contains('w') || mode.contains('a') || mode.contains('+') {
            RelationType::Writes
        } else {
            RelationType::Reads
        };
        self.builder.relation(owner.to_string(), target, relation_type);
    }
}

/// Unwrap a decorated_definition to the definition inside it.
fn definition_of<'t>(node: &Node<'t>) -> Node<'t> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(*node)
    } else {
        *node
    }
}

fn decorator_names(node: &Node, source: &[u8]) -> Vec<String> {
    if node.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(&child, source).trim_start_matches('@');
            let name = text.split('(').next().unwrap_or(text).trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(&n, source).to_string())
        .filter(|s| !s.is_empty())
}

/// Docstring of a module or block: a leading expression statement holding a
/// string literal.
fn docstring_of_block(block: &Node, source: &[u8]) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = strip_string_quotes(node_text(&string, source));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn strip_string_quotes(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

fn count_params(parameters: &Node, source: &[u8]) -> usize {
    let mut cursor = parameters.walk();
    parameters
        .named_children(&mut cursor)
        .filter(|p| {
            let text = node_text(p, source);
            text != "self" && text != "cls"
        })
        .count()
}

fn returns_value(body: &Node) -> bool {
    let mut stack = vec![*body];
    while let Some(node) = stack.pop() {
        if node.kind() == "return_statement" && node.named_child_count() > 0 {
            return true;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "function_definition" | "class_definition") {
                continue;
            }
            stack.push(child);
        }
    }
    false
}

fn exception_name(raise: &Node, source: &[u8]) -> Option<String> {
    let raised = raise.named_child(0)?;
    let name = match raised.kind() {
        "call" => raised
            .child_by_field_name("function")
            .map(|f| node_text(&f, source).to_string())?,
        _ => node_text(&raised, source).to_string(),
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn caught_exception(clause: &Node, source: &[u8]) -> Option<String> {
    let mut cursor = clause.walk();
    let typ = clause
        .named_children(&mut cursor)
        .find(|c| c.kind() != "block")?;
    let text = node_text(&typ, source);
    // `except (A, B) as e` keeps the tuple text; the tag is advisory.
    let name = text.split(" as ").next().unwrap_or(text).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemem_core::ChunkKind;

    fn parse(source: &str, path: &str) -> ParseOutcome {
        PythonParser::new()
            .parse(source.as_bytes(), Path::new(path))
            .expect("parse succeeds")
    }

    const SAMPLE: &str = r#""""User storage helpers."""

import json
from pathlib import Path


class UserStore:
    """Keeps users on disk."""

    def __init__(self, root):
        self.root = root

    def load(self, name):
        """Load one user record."""
        with open("users.json", "r") as handle:
            data = json.load(handle)
        if name not in data:
            raise KeyError(name)
        return data[name]

    def save(self, name, record):
        with open("users.json", "w") as handle:
            json.dump(record, handle)


def make_store(root):
    """Build the default store."""
    return UserStore(root)
"#;

    #[test]
    fn extracts_file_class_methods_and_function() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        let names: Vec<&str> = outcome.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names[0], "/repo/users.py", "file entity comes first");
        assert!(names.contains(&"users::UserStore"));
        assert!(names.contains(&"users::UserStore::__init__"));
        assert!(names.contains(&"users::UserStore::load"));
        assert!(names.contains(&"users::UserStore::save"));
        assert!(names.contains(&"users::make_store"));
    }

    #[test]
    fn every_entity_has_one_metadata_chunk() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        assert_eq!(
            outcome.metadata_chunks().count(),
            outcome.entities.len(),
            "one metadata chunk per entity"
        );
        // File entity gets no implementation chunk; everything else here does.
        assert_eq!(
            outcome.implementation_chunks().count(),
            outcome.entities.len() - 1
        );
    }

    #[test]
    fn file_entity_metadata_has_no_implementation() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        let file_meta = outcome
            .metadata_chunks()
            .find(|c| c.entity_type == EntityType::File)
            .unwrap();
        assert!(!file_meta.has_implementation);
        assert!(file_meta.content.contains("purpose:User storage helpers."));
    }

    #[test]
    fn emits_imports_inherits_contains_and_calls() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        let has = |f: &str, t: &str, ty: RelationType| {
            outcome
                .relations
                .iter()
                .any(|r| r.from_entity == f && r.to_entity == t && r.relation_type == ty)
        };
        assert!(has("/repo/users.py", "json", RelationType::Imports));
        assert!(has("/repo/users.py", "pathlib::Path", RelationType::Imports));
        assert!(has(
            "/repo/users.py",
            "users::UserStore",
            RelationType::Contains
        ));
        assert!(has(
            "users::UserStore",
            "users::UserStore::load",
            RelationType::Contains
        ));
        assert!(has(
            "users::make_store",
            "users::UserStore",
            RelationType::Instantiates
        ));
        assert!(has(
            "users::UserStore::load",
            "KeyError",
            RelationType::Raises
        ));
        assert!(has(
            "users::UserStore::load",
            "users.json",
            RelationType::Reads
        ));
        assert!(has(
            "users::UserStore::save",
            "users.json",
            RelationType::Writes
        ));
    }

    #[test]
    fn method_observations_carry_purpose_and_calls() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        let load = outcome
            .entities
            .iter()
            .find(|e| e.name == "users::UserStore::load")
            .unwrap();
        assert_eq!(load.entity_type, EntityType::Method);
        assert!(load
            .observations
            .contains(&"purpose:Load one user record.".to_string()));
        assert!(load.observations.contains(&"calls:json.load".to_string()));
        assert!(load.observations.contains(&"params:1".to_string()));
    }

    #[test]
    fn duplicate_defs_get_line_suffix_on_collision() {
        let source = "def twice():\n    pass\n\ndef twice():\n    pass\n";
        let outcome = parse(source, "/repo/dup.py");
        let names: Vec<&str> = outcome
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Function)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["dup::twice", "dup::twice#4"]);
    }

    #[test]
    fn unicode_identifiers_survive() {
        let source = "def café():\n    return 1\n";
        let outcome = parse(source, "/repo/menu.py");
        assert!(outcome.entities.iter().any(|e| e.name == "menu::café"));
    }

    #[test]
    fn empty_file_yields_only_file_entity() {
        let outcome = parse("", "/repo/empty.py");
        assert_eq!(outcome.entities.len(), 1);
        assert_eq!(outcome.entities[0].entity_type, EntityType::File);
        assert_eq!(outcome.metadata_chunks().count(), 1);
        assert_eq!(outcome.implementation_chunks().count(), 0);
    }

    #[test]
    fn comments_only_file_yields_only_file_entity() {
        let outcome = parse("# nothing here\n# at all\n", "/repo/comments.py");
        assert_eq!(outcome.entities.len(), 1);
    }

    #[test]
    fn unresolved_callee_kept_as_raw_string() {
        let source = "def go():\n    mystery_helper()\n";
        let outcome = parse(source, "/repo/go.py");
        assert!(outcome.relations.iter().any(|r| {
            r.from_entity == "go::go"
                && r.to_entity == "mystery_helper"
                && r.relation_type == RelationType::Calls
        }));
    }

    #[test]
    fn async_functions_are_tagged() {
        let source = "async def fetch():\n    return 1\n";
        let outcome = parse(source, "/repo/net.py");
        let fetch = outcome
            .entities
            .iter()
            .find(|e| e.name == "net::fetch")
            .unwrap();
        assert!(fetch.observations.contains(&"async:true".to_string()));
        let meta = outcome
            .metadata_chunks()
            .find(|c| c.entity_name == "net::fetch")
            .unwrap();
        assert!(meta.content.starts_with("async def fetch"));
    }

    #[test]
    fn decorated_function_links_decorator() {
        let source = "@cached\ndef slow():\n    return 1\n";
        let outcome = parse(source, "/repo/memo.py");
        assert!(outcome.relations.iter().any(|r| {
            r.from_entity == "cached"
                && r.to_entity == "memo::slow"
                && r.relation_type == RelationType::Decorates
        }));
        let slow = outcome
            .entities
            .iter()
            .find(|e| e.name == "memo::slow")
            .unwrap();
        assert!(slow.observations.contains(&"decorator:cached".to_string()));
    }

    #[test]
    fn implementation_chunk_contains_verbatim_span() {
        let outcome = parse(SAMPLE, "/repo/users.py");
        let imp = outcome
            .implementation_chunks()
            .find(|c| c.entity_name == "users::make_store")
            .unwrap();
        assert!(imp.content.starts_with("def make_store(root):"));
        assert_eq!(imp.kind, ChunkKind::Implementation);
        let meta = outcome
            .metadata_chunks()
            .find(|c| c.entity_name == "users::make_store")
            .unwrap();
        assert!(meta.has_implementation);
    }
}
