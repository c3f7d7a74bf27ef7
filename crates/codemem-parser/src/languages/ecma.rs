// ABOUTME: JavaScript and TypeScript extraction over the tree-sitter grammars
// ABOUTME: One extractor, dialect-selected grammar (js/jsx vs ts/tsx)

use crate::complexity::decision_points;
use crate::languages::util::{count_lines, node_span, node_text, OutcomeBuilder};
use crate::observations::EntityFacts;
use crate::registry::{ParseOutcome, SourceParser};
use codemem_core::{EntityType, IndexError, RelationType, Result};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmaDialect {
    JavaScript,
    TypeScript,
}

pub struct EcmaParser {
    dialect: EcmaDialect,
}

impl EcmaParser {
    pub fn new(dialect: EcmaDialect) -> Self {
        Self { dialect }
    }

    fn grammar_for(&self, file_path: &Path) -> tree_sitter::Language {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match (self.dialect, ext.as_str()) {
            (EcmaDialect::TypeScript, "tsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            (EcmaDialect::TypeScript, _) => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            (EcmaDialect::JavaScript, _) => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

impl SourceParser for EcmaParser {
    fn language(&self) -> &'static str {
        match self.dialect {
            EcmaDialect::JavaScript => "javascript",
            EcmaDialect::TypeScript => "typescript",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self.dialect {
            EcmaDialect::JavaScript => &["js", "jsx", "mjs", "cjs"],
            EcmaDialect::TypeScript => &["ts", "tsx"],
        }
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutcome> {
        let text = std::str::from_utf8(source).map_err(|e| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.grammar_for(file_path))
            .map_err(|e| IndexError::Parse {
                file: file_path.display().to_string(),
                detail: e.to_string(),
            })?;
        let tree = parser.parse(text, None).ok_or_else(|| IndexError::Parse {
            file: file_path.display().to_string(),
            detail: "tree-sitter produced no tree".to_string(),
        })?;

        let root = tree.root_node();
        let mut extractor = EcmaExtractor::new(source, file_path);
        extractor.collect_declared_names(&root);
        let file_name = extractor
            .builder
            .file_entity(count_lines(text), leading_doc_comment(&root, source));
        extractor.file_name = file_name;
        extractor.walk_program(&root);
        Ok(extractor.builder.finish())
    }
}

struct EcmaExtractor<'s> {
    source: &'s [u8],
    builder: OutcomeBuilder,
    file_name: String,
    declared: HashMap<String, String>,
}

impl<'s> EcmaExtractor<'s> {
    fn new(source: &'s [u8], file_path: &Path) -> Self {
        Self {
            source,
            builder: OutcomeBuilder::new(file_path),
            file_name: String::new(),
            declared: HashMap::new(),
        }
    }

    fn collect_declared_names(&mut self, root: &Node) {
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let node = unwrap_export(&child);
            match node.kind() {
                "function_declaration" | "generator_function_declaration" | "class_declaration"
                | "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                    if let Some(name) = field_text(&node, "name", self.source) {
                        let qualified = self.builder.qualified(&[&name]);
                        self.declared.entry(name).or_insert(qualified);
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    for declarator in named_of_kind(&node, "variable_declarator") {
                        if let Some(name) = field_text(&declarator, "name", self.source) {
                            let qualified = self.builder.qualified(&[&name]);
                            self.declared.entry(name).or_insert(qualified);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_program(&mut self, root: &Node) {
        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();
        for child in children {
            let node = unwrap_export(&child);
            match node.kind() {
                "import_statement" => self.emit_import(&node),
                "function_declaration" | "generator_function_declaration" => {
                    self.emit_function(&node, &[], EntityType::Function)
                }
                "class_declaration" => self.emit_class(&node),
                "lexical_declaration" | "variable_declaration" => self.emit_declaration(&node),
                "interface_declaration" => self.emit_type_entity(&node, "interface"),
                "type_alias_declaration" => self.emit_type_entity(&node, "type_alias"),
                "enum_declaration" => self.emit_type_entity(&node, "enum"),
                "expression_statement" => self.emit_anonymous(&node),
                _ => {}
            }
        }
    }

    fn emit_import(&mut self, node: &Node) {
        if let Some(source_node) = node.child_by_field_name("source") {
            let target = strip_quotes(node_text(&source_node, self.source));
            if !target.is_empty() {
                self.builder
                    .relation(self.file_name.clone(), target, RelationType::Imports);
            }
        }
    }

    fn emit_function(&mut self, node: &Node, scope: &[&str], entity_type: EntityType) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        self.emit_callable(node, node, scope, name, entity_type, Vec::new());
    }

    /// Shared path for declarations, methods, and named arrow functions.
    /// `outer` carries the span and implementation text.
    #[allow(clippy::too_many_arguments)]
    fn emit_callable(
        &mut self,
        node: &Node,
        outer: &Node,
        scope: &[&str],
        name: String,
        entity_type: EntityType,
        decorators: Vec<String>,
    ) {
        let mut parts: Vec<&str> = scope.to_vec();
        parts.push(&name);
        let candidate = self.builder.qualified(&parts);
        let span = node_span(outer);
        let qualified = self.builder.unique_name(candidate, span.start);

        let params_node = node
            .child_by_field_name("parameters")
            .or_else(|| node.child_by_field_name("parameter"));
        let is_async = node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| node_text(&n, self.source).trim_start_matches(':').trim().to_string());

        let body = node.child_by_field_name("body");
        let mut facts = EntityFacts {
            docstring: doc_comment_before(outer, self.source),
            params: params_node.map(|p| p.named_child_count()),
            returns: return_type.clone(),
            is_async: Some(is_async),
            decorators: decorators.clone(),
            ..EntityFacts::default()
        };
        if let Some(body) = body {
            facts.complexity_score = Some(decision_points(&body, self.source));
            self.collect_body_relations(&body, &qualified, &mut facts);
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

        let params_text = params_node
            .map(|p| node_text(&p, self.source).to_string())
            .unwrap_or_else(|| "()".to_string());
        let mut signature = String::new();
        if is_async {
            signature.push_str("async ");
        }
        signature.push_str("function ");
        signature.push_str(&name);
        signature.push_str(&params_text);
        if let Some(ret) = &return_type {
            signature.push_str(": ");
            signature.push_str(ret);
        }

        let implementation = node_text(outer, self.source).to_string();
        self.builder.add_entity(
            qualified,
            entity_type,
            span,
            signature,
            facts,
            Some(implementation),
        );
    }

    fn emit_class(&mut self, node: &Node) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let span = node_span(node);
        let candidate = self.builder.qualified(&[&name]);
        let qualified = self.builder.unique_name(candidate, span.start);

        let mut bases = Vec::new();
        for heritage in named_of_kind(node, "class_heritage") {
            let mut stack = vec![heritage];
            while let Some(current) = stack.pop() {
                match current.kind() {
                    "identifier" | "member_expression" => {
                        let base = node_text(&current, self.source).to_string();
                        let target = self.declared.get(&base).cloned().unwrap_or(base.clone());
                        self.builder
                            .relation(qualified.clone(), target, RelationType::Inherits);
                        bases.push(base);
                    }
                    _ => {
                        let mut cursor = current.walk();
                        for child in current.named_children(&mut cursor) {
                            stack.push(child);
                        }
                    }
                }
            }
        }

        self.builder.contains(self.file_name.clone(), qualified.clone());

        let facts = EntityFacts {
            docstring: doc_comment_before(node, self.source),
            ..EntityFacts::default()
        };
        let signature = if bases.is_empty() {
            format!("class {}", name)
        } else {
            format!("class {} extends {}", name, bases.join(", "))
        };
        self.builder.add_entity(
            qualified,
            EntityType::Class,
            span,
            signature,
            facts,
            Some(node_text(node, self.source).to_string()),
        );

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let members: Vec<Node> = body.named_children(&mut cursor).collect();
            for member in members {
                if member.kind() == "method_definition" {
                    let decorators = decorator_names(&member, self.source);
                    if let Some(method_name) = field_text(&member, "name", self.source) {
                        self.emit_callable(
                            &member,
                            &member,
                            &[&name],
                            method_name,
                            EntityType::Method,
                            decorators,
                        );
                    }
                }
            }
        }
    }

    /// const/let/var declarations: arrow and function expressions become
    /// functions, everything else a variable.
    fn emit_declaration(&mut self, node: &Node) {
        for declarator in named_of_kind(node, "variable_declarator") {
            let Some(name) = field_text(&declarator, "name", self.source) else {
                continue;
            };
            let value = declarator.child_by_field_name("value");
            match value.map(|v| v.kind()) {
                Some("arrow_function") | Some("function_expression") | Some("function") => {
                    let value = value.unwrap();
                    self.emit_callable(
                        &value,
                        node,
                        &[],
                        name,
                        EntityType::Function,
                        Vec::new(),
                    );
                }
                _ => {
                    let span = node_span(node);
                    let candidate = self.builder.qualified(&[&name]);
                    let qualified = self.builder.unique_name(candidate, span.start);
                    self.builder.contains(self.file_name.clone(), qualified.clone());
                    self.builder.add_entity(
                        qualified,
                        EntityType::Variable,
                        span,
                        first_line(node_text(node, self.source)),
                        EntityFacts::default(),
                        None,
                    );
                }
            }
        }
    }

    fn emit_type_entity(&mut self, node: &Node, kind: &str) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let span = node_span(node);
        let candidate = self.builder.qualified(&[&name]);
        let qualified = self.builder.unique_name(candidate, span.start);
        self.builder.contains(self.file_name.clone(), qualified.clone());
        let facts = EntityFacts {
            docstring: doc_comment_before(node, self.source),
            ..EntityFacts::default()
        };
        self.builder.add_entity(
            qualified,
            EntityType::Other(kind.to_string()),
            span,
            first_line(node_text(node, self.source)),
            facts,
            Some(node_text(node, self.source).to_string()),
        );
    }

    /// Top-level anonymous callables (IIFEs, bare arrows) get synthetic names.
    fn emit_anonymous(&mut self, statement: &Node) {
        let Some(expr) = statement.named_child(0) else {
            return;
        };
        let callable = match expr.kind() {
            "arrow_function" | "function_expression" | "function" => expr,
            "call_expression" => {
                let Some(function) = expr.child_by_field_name("function") else {
                    return;
                };
                let inner = if function.kind() == "parenthesized_expression" {
                    function.named_child(0)
                } else {
                    None
                };
                match inner {
                    Some(f) if matches!(f.kind(), "arrow_function" | "function_expression" | "function") => f,
                    _ => return,
                }
            }
            _ => return,
        };

        let span = node_span(statement);
        let name = self.builder.anon_name(span.start);
        let qualified = self.builder.unique_name(name, span.start);
        self.builder.contains(self.file_name.clone(), qualified.clone());

        let mut facts = EntityFacts {
            is_async: Some(
                callable
                    .child(0)
                    .map(|c| c.kind() == "async")
                    .unwrap_or(false),
            ),
            ..EntityFacts::default()
        };
        if let Some(body) = callable.child_by_field_name("body") {
            facts.complexity_score = Some(decision_points(&body, self.source));
            self.collect_body_relations(&body, &qualified, &mut facts);
        }
        self.builder.add_entity(
            qualified,
            EntityType::Function,
            span,
            first_line(node_text(statement, self.source)),
            facts,
            Some(node_text(statement, self.source).to_string()),
        );
    }

    fn collect_body_relations(&mut self, body: &Node, owner: &str, facts: &mut EntityFacts) {
        let mut stack = vec![*body];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "call_expression" => {
                    if let Some(function) = node.child_by_field_name("function") {
                        let callee = node_text(&function, self.source).to_string();
                        if !callee.is_empty() && !callee.starts_with('(') {
                            facts.calls.push(callee.clone());
                            let simple = callee.rsplit('.').next().unwrap_or(&callee);
                            let resolvable =
                                !callee.contains('.') || callee.starts_with("this.");
                            let resolved = if resolvable {
                                self.declared.get(simple).cloned().unwrap_or(callee.clone())
                            } else {
                                callee.clone()
                            };
                            self.builder
                                .relation(owner.to_string(), resolved, RelationType::Calls);
                        }
                    }
                }
                "new_expression" => {
                    if let Some(constructor) = node.child_by_field_name("constructor") {
                        let name = node_text(&constructor, self.source).to_string();
                        if !name.is_empty() {
                            let resolved =
                                self.declared.get(&name).cloned().unwrap_or(name.clone());
                            self.builder.relation(
                                owner.to_string(),
                                resolved,
                                RelationType::Instantiates,
                            );
                        }
                    }
                }
                "throw_statement" => {
                    if let Some(thrown) = thrown_name(&node, self.source) {
                        facts.raises.push(thrown.clone());
                        self.builder
                            .relation(owner.to_string(), thrown, RelationType::Raises);
                    }
                }
                "catch_clause" => {
                    let caught = node
                        .child_by_field_name("parameter")
                        .map(|p| node_text(&p, self.source).to_string())
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "Error".to_string());
                    facts.catches.push(caught.clone());
                    self.builder
                        .relation(owner.to_string(), caught, RelationType::Catches);
                }
                _ => {}
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if matches!(
                    child.kind(),
                    "function_declaration" | "class_declaration" | "method_definition"
                ) {
                    continue;
                }
                stack.push(child);
            }
        }
    }
}

fn unwrap_export<'t>(node: &Node<'t>) -> Node<'t> {
    if node.kind() == "export_statement" {
        node.child_by_field_name("declaration")
            .or_else(|| node.named_child(0))
            .unwrap_or(*node)
    } else {
        *node
    }
}

fn named_of_kind<'t>(node: &Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() == kind)
        .collect()
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(&n, source).to_string())
        .filter(|s| !s.is_empty())
}

fn decorator_names(node: &Node, source: &[u8]) -> Vec<String> {
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

fn thrown_name(throw: &Node, source: &[u8]) -> Option<String> {
    let expr = throw.named_child(0)?;
    let name = match expr.kind() {
        "new_expression" => expr
            .child_by_field_name("constructor")
            .map(|c| node_text(&c, source).to_string())?,
        "call_expression" => expr
            .child_by_field_name("function")
            .map(|f| node_text(&f, source).to_string())?,
        _ => node_text(&expr, source).to_string(),
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// JSDoc-style block comment directly above a declaration.
fn doc_comment_before(node: &Node, source: &[u8]) -> Option<String> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = node_text(&prev, source);
    if !text.starts_with("/**") {
        return None;
    }
    let cleaned = text
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn leading_doc_comment(root: &Node, source: &[u8]) -> Option<String> {
    let first = root.named_child(0)?;
    if first.kind() != "comment" {
        return None;
    }
    let text = node_text(&first, source);
    if text.starts_with("/**") || text.starts_with("//!") {
        let cleaned = text
            .trim_start_matches("/**")
            .trim_start_matches("//!")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }
    None
}

fn strip_quotes(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).trim().to_string()
}
