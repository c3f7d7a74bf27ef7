// ABOUTME: Wire contract for stored points: chunk and relation payloads
// ABOUTME: Manual records are chunk payloads with no file_path key

use codemem_core::{content_hash, Chunk, Relation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored with every point. `type` discriminates on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointPayload {
    Chunk(ChunkPayload),
    Relation(RelationPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_type: String,
    pub entity_name: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_implementation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPayload {
    pub relation_type: String,
    pub from_entity: String,
    pub to_entity: String,
    pub file_path: String,
    pub content: String,
    pub content_hash: String,
}

impl PointPayload {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        PointPayload::Chunk(ChunkPayload {
            chunk_type: chunk.kind.to_string(),
            entity_name: chunk.entity_name.clone(),
            entity_type: chunk.entity_type.to_string(),
            file_path: Some(chunk.file_path.clone()),
            line_start: chunk.line_span.start,
            line_end: chunk.line_span.end,
            content: chunk.content.clone(),
            content_hash: chunk.content_hash.clone(),
            has_implementation: Some(chunk.has_implementation),
            semantic_metadata: chunk.semantic_metadata.clone(),
        })
    }

    pub fn from_relation(relation: &Relation) -> Self {
        let content = relation.render();
        let content_hash = content_hash(&content);
        PointPayload::Relation(RelationPayload {
            relation_type: relation.relation_type.to_string(),
            from_entity: relation.from_entity.clone(),
            to_entity: relation.to_entity.clone(),
            file_path: relation.file_path.clone(),
            content,
            content_hash,
        })
    }

    /// Manual records are user-authored and never touched by indexing.
    pub fn is_manual(&self) -> bool {
        match self {
            PointPayload::Chunk(chunk) => chunk.file_path.is_none(),
            PointPayload::Relation(_) => false,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            PointPayload::Chunk(chunk) => chunk.file_path.as_deref(),
            PointPayload::Relation(relation) => Some(relation.file_path.as_str()),
        }
    }

    pub fn content_hash(&self) -> &str {
        match self {
            PointPayload::Chunk(chunk) => &chunk.content_hash,
            PointPayload::Relation(relation) => &relation.content_hash,
        }
    }
}

/// A point ready for upsert.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl Point {
    pub fn for_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.point_id(),
            vector,
            payload: PointPayload::from_chunk(chunk),
        }
    }

    pub fn for_relation(relation: &Relation, vector: Vec<f32>) -> Self {
        Self {
            id: relation.point_id(),
            vector,
            payload: PointPayload::from_relation(relation),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    Chunk,
    Relation,
}

/// Payload predicate understood by every store implementation. All set
/// fields must match; `relation_endpoint` matches either end.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    pub point_type: Option<PointType>,
    pub chunk_type: Option<String>,
    pub file_path: Option<String>,
    pub entity_name: Option<String>,
    pub relation_endpoint: Option<String>,
    /// Restrict to parser-produced points (those carrying a file_path);
    /// manual records never match.
    pub automatic_only: bool,
}

impl PointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks() -> Self {
        Self {
            point_type: Some(PointType::Chunk),
            ..Self::default()
        }
    }

    pub fn relations() -> Self {
        Self {
            point_type: Some(PointType::Relation),
            ..Self::default()
        }
    }

    pub fn with_file_path<S: Into<String>>(mut self, file_path: S) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_chunk_type<S: Into<String>>(mut self, chunk_type: S) -> Self {
        self.chunk_type = Some(chunk_type.into());
        self
    }

    pub fn with_entity_name<S: Into<String>>(mut self, entity_name: S) -> Self {
        self.entity_name = Some(entity_name.into());
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.relation_endpoint = Some(endpoint.into());
        self
    }

    pub fn automatic_only(mut self) -> Self {
        self.automatic_only = true;
        self
    }

    pub fn matches(&self, payload: &PointPayload) -> bool {
        if self.automatic_only && payload.is_manual() {
            return false;
        }
        match payload {
            PointPayload::Chunk(chunk) => {
                if self.point_type == Some(PointType::Relation) {
                    return false;
                }
                if let Some(chunk_type) = &self.chunk_type {
                    if &chunk.chunk_type != chunk_type {
                        return false;
                    }
                }
                if let Some(file_path) = &self.file_path {
                    if chunk.file_path.as_deref() != Some(file_path.as_str()) {
                        return false;
                    }
                }
                if let Some(entity_name) = &self.entity_name {
                    if &chunk.entity_name != entity_name {
                        return false;
                    }
                }
                if self.relation_endpoint.is_some() {
                    return false;
                }
                true
            }
            PointPayload::Relation(relation) => {
                if self.point_type == Some(PointType::Chunk) {
                    return false;
                }
                if self.chunk_type.is_some() || self.entity_name.is_some() {
                    return false;
                }
                if let Some(file_path) = &self.file_path {
                    if &relation.file_path != file_path {
                        return false;
                    }
                }
                if let Some(endpoint) = &self.relation_endpoint {
                    if &relation.from_entity != endpoint && &relation.to_entity != endpoint {
                        return false;
                    }
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemem_core::{Entity, EntityType, LineSpan, RelationType};

    fn chunk_payload() -> PointPayload {
        let entity = Entity::new(
            "users::load",
            EntityType::Function,
            "/repo/users.py",
            LineSpan::new(1, 5),
        );
        PointPayload::from_chunk(&Chunk::metadata(&entity, "def load()".into(), true))
    }

    fn relation_payload() -> PointPayload {
        PointPayload::from_relation(&Relation::new(
            "users::load",
            "json.load",
            RelationType::Calls,
            "/repo/users.py",
        ))
    }

    #[test]
    fn payload_roundtrips_through_json() {
        for payload in [chunk_payload(), relation_payload()] {
            let json = serde_json::to_value(&payload).unwrap();
            let back: PointPayload = serde_json::from_value(json.clone()).unwrap();
            assert_eq!(back, payload);
            assert!(json.get("type").is_some(), "type tag present on the wire");
            assert!(json.get("content_hash").is_some(), "hash is mandatory");
        }
    }

    #[test]
    fn manual_records_have_no_file_path() {
        let manual = PointPayload::Chunk(ChunkPayload {
            chunk_type: "metadata".into(),
            entity_name: "team-decision".into(),
            entity_type: "manual_note".into(),
            file_path: None,
            line_start: 0,
            line_end: 0,
            content: "We ship on Fridays.".into(),
            content_hash: content_hash("We ship on Fridays."),
            has_implementation: Some(false),
            semantic_metadata: None,
        });
        assert!(manual.is_manual());
        assert!(!chunk_payload().is_manual());

        let json = serde_json::to_value(&manual).unwrap();
        assert!(json.get("file_path").is_none(), "marker is key absence");
    }

    #[test]
    fn filters_respect_type_and_file() {
        let chunk = chunk_payload();
        let relation = relation_payload();

        assert!(PointFilter::chunks().matches(&chunk));
        assert!(!PointFilter::chunks().matches(&relation));
        assert!(PointFilter::relations().matches(&relation));

        let by_file = PointFilter::new().with_file_path("/repo/users.py");
        assert!(by_file.matches(&chunk));
        assert!(by_file.matches(&relation));
        let other_file = PointFilter::new().with_file_path("/repo/other.py");
        assert!(!other_file.matches(&chunk));
    }

    #[test]
    fn endpoint_filter_matches_either_end() {
        let relation = relation_payload();
        assert!(PointFilter::relations()
            .with_endpoint("users::load")
            .matches(&relation));
        assert!(PointFilter::relations()
            .with_endpoint("json.load")
            .matches(&relation));
        assert!(!PointFilter::relations()
            .with_endpoint("missing")
            .matches(&relation));
    }

    #[test]
    fn automatic_only_excludes_manual() {
        let manual = PointPayload::Chunk(ChunkPayload {
            chunk_type: "metadata".into(),
            entity_name: "note".into(),
            entity_type: "manual_note".into(),
            file_path: None,
            line_start: 0,
            line_end: 0,
            content: "note".into(),
            content_hash: content_hash("note"),
            has_implementation: Some(false),
            semantic_metadata: None,
        });
        assert!(!PointFilter::new().automatic_only().matches(&manual));
        assert!(PointFilter::new().matches(&manual));
    }
}
