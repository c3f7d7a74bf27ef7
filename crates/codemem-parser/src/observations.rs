// ABOUTME: Semantic tag rendering for entities (the fixed key:value schema)
// ABOUTME: Observations are advisory; absence of any tag is never an error

use crate::complexity::{bucket, ComplexityBucket};

/// Raw facts a language parser collects for one entity. The extractor turns
/// them into the fixed tag schema; parsers never format tags themselves.
#[derive(Debug, Default, Clone)]
pub struct EntityFacts {
    pub docstring: Option<String>,
    pub params: Option<usize>,
    pub returns: Option<String>,
    pub complexity_score: Option<usize>,
    pub calls: Vec<String>,
    pub raises: Vec<String>,
    pub catches: Vec<String>,
    pub decorators: Vec<String>,
    pub is_async: Option<bool>,
}

impl EntityFacts {
    pub fn complexity_bucket(&self) -> Option<ComplexityBucket> {
        self.complexity_score.map(bucket)
    }
}

/// Render facts into `key:value` observation tags, in schema order.
pub fn render_observations(name: &str, facts: &EntityFacts) -> Vec<String> {
    let mut tags = Vec::new();

    if let Some(doc) = &facts.docstring {
        if let Some(sentence) = first_sentence(doc) {
            tags.push(format!("purpose:{}", sentence));
        }
    }
    if let Some(params) = facts.params {
        tags.push(format!("params:{}", params));
    }
    if let Some(returns) = &facts.returns {
        tags.push(format!("returns:{}", returns));
    }
    if let Some(bucket) = facts.complexity_bucket() {
        tags.push(format!("complexity:{}", bucket.as_str()));
    }
    for callee in &facts.calls {
        tags.push(format!("calls:{}", callee));
    }
    for raised in &facts.raises {
        tags.push(format!("raises:{}", raised));
    }
    for caught in &facts.catches {
        tags.push(format!("catches:{}", caught));
    }
    for decorator in &facts.decorators {
        tags.push(format!("decorator:{}", decorator));
    }
    if let Some(pattern) = detect_pattern(name) {
        tags.push(format!("pattern:{}", pattern));
    }
    if let Some(is_async) = facts.is_async {
        tags.push(format!("async:{}", is_async));
    }

    tags
}

/// First sentence of a doc comment, single-line, capped so metadata chunks
/// stay compact.
pub fn first_sentence(doc: &str) -> Option<String> {
    let flattened = doc
        .lines()
        .map(str::trim)
        .take_while(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if flattened.is_empty() {
        return None;
    }
    let end = flattened
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(flattened.len());
    let mut sentence = flattened[..end].trim().to_string();
    if sentence.chars().count() > 160 {
        sentence = sentence.chars().take(157).collect::<String>() + "...";
    }
    Some(sentence)
}

/// Name-based design pattern heuristic. False positives are acceptable.
pub fn detect_pattern(name: &str) -> Option<&'static str> {
    let simple = name.rsplit("::").next().unwrap_or(name).to_ascii_lowercase();
    const PATTERNS: &[(&str, &str)] = &[
        ("factory", "factory"),
        ("singleton", "singleton"),
        ("observer", "observer"),
        ("listener", "observer"),
        ("builder", "builder"),
        ("adapter", "adapter"),
        ("visitor", "visitor"),
        ("strategy", "strategy"),
        ("proxy", "proxy"),
    ];
    PATTERNS
        .iter()
        .find(|(needle, _)| simple.contains(needle))
        .map(|(_, pattern)| *pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_schema_order() {
        let facts = EntityFacts {
            docstring: Some("Load users from disk. Retries on failure.".to_string()),
            params: Some(2),
            returns: Some("dict".to_string()),
            complexity_score: Some(6),
            calls: vec!["open".to_string(), "json.load".to_string()],
            raises: vec!["ValueError".to_string()],
            catches: vec![],
            decorators: vec!["cached".to_string()],
            is_async: Some(false),
        };
        let tags = render_observations("users::load_users", &facts);
        assert_eq!(
            tags,
            vec![
                "purpose:Load users from disk.",
                "params:2",
                "returns:dict",
                "complexity:medium",
                "calls:open",
                "calls:json.load",
                "raises:ValueError",
                "decorator:cached",
                "async:false",
            ]
        );
    }

    #[test]
    fn empty_facts_render_empty() {
        let tags = render_observations("x", &EntityFacts::default());
        assert!(tags.is_empty());
    }

    #[test]
    fn pattern_detection_is_name_based() {
        assert_eq!(detect_pattern("users::UserFactory"), Some("factory"));
        assert_eq!(detect_pattern("config::ConfigBuilder"), Some("builder"));
        assert_eq!(detect_pattern("events::ChangeListener"), Some("observer"));
        assert_eq!(detect_pattern("users::load_users"), None);
    }

    #[test]
    fn first_sentence_handles_multiline_docstrings() {
        let doc = "Parse the config file\nand merge defaults. Extra detail here.";
        assert_eq!(
            first_sentence(doc),
            Some("Parse the config file and merge defaults.".to_string())
        );
    }
}
