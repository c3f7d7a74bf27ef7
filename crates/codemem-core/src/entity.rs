use crate::{content_hash, ChunkKind, EntityType, LineSpan, RelationType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving stable point ids from chunk and relation keys.
const POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// A named, typed node extracted from a file. Non-manual entities are owned
/// by exactly one file and removed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    pub file_path: String,
    pub line_span: LineSpan,
    pub observations: Vec<String>,
}

impl Entity {
    pub fn new<N: Into<String>, F: Into<String>>(
        name: N,
        entity_type: EntityType,
        file_path: F,
        line_span: LineSpan,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type,
            file_path: file_path.into(),
            line_span,
            observations: Vec::new(),
        }
    }

    pub fn with_observations(mut self, observations: Vec<String>) -> Self {
        self.observations = observations;
        self
    }
}

/// A directed, typed edge between two entity names, owned by the file whose
/// parse produced it. Endpoints may be external names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub from_entity: String,
    pub to_entity: String,
    pub relation_type: RelationType,
    pub file_path: String,
}

impl Relation {
    pub fn new<F, T, P>(from: F, to: T, relation_type: RelationType, file_path: P) -> Self
    where
        F: Into<String>,
        T: Into<String>,
        P: Into<String>,
    {
        Self {
            from_entity: from.into(),
            to_entity: to.into(),
            relation_type,
            file_path: file_path.into(),
        }
    }

    /// Uniqueness key `(from, to, type, file_path)` rendered as the point key.
    pub fn key(&self) -> String {
        format!(
            "{}::{}->{}::{}::relation",
            self.file_path, self.from_entity, self.to_entity, self.relation_type
        )
    }

    pub fn point_id(&self) -> Uuid {
        point_id_for(&self.key())
    }

    /// The text embedded for a relation point.
    pub fn render(&self) -> String {
        format!(
            "{} {} {}",
            self.from_entity, self.relation_type, self.to_entity
        )
    }
}

/// The unit actually embedded and stored. Every entity gets one metadata
/// chunk; entities with bodies additionally get an implementation chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub kind: ChunkKind,
    pub content: String,
    pub content_hash: String,
    pub entity_name: String,
    pub entity_type: EntityType,
    pub file_path: String,
    pub line_span: LineSpan,
    pub has_implementation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_metadata: Option<serde_json::Value>,
}

impl Chunk {
    pub fn metadata(entity: &Entity, content: String, has_implementation: bool) -> Self {
        let id = chunk_id(&entity.file_path, &entity.name, ChunkKind::Metadata);
        let content_hash = content_hash(&content);
        Self {
            id,
            kind: ChunkKind::Metadata,
            content,
            content_hash,
            entity_name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
            file_path: entity.file_path.clone(),
            line_span: entity.line_span,
            has_implementation,
            semantic_metadata: None,
        }
    }

    pub fn implementation(entity: &Entity, content: String) -> Self {
        let id = chunk_id(&entity.file_path, &entity.name, ChunkKind::Implementation);
        let content_hash = content_hash(&content);
        Self {
            id,
            kind: ChunkKind::Implementation,
            content,
            content_hash,
            entity_name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
            file_path: entity.file_path.clone(),
            line_span: entity.line_span,
            has_implementation: true,
            semantic_metadata: None,
        }
    }

    pub fn with_semantic_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.semantic_metadata = Some(metadata);
        self
    }

    pub fn point_id(&self) -> Uuid {
        point_id_for(&self.id)
    }
}

/// Deterministic chunk id: `{file_path}::{entity_name}::{kind}`.
pub fn chunk_id(file_path: &str, entity_name: &str, kind: ChunkKind) -> String {
    format!("{}::{}::{}", file_path, entity_name, kind)
}

/// Stable point id for any chunk or relation key.
pub fn point_id_for(key: &str) -> Uuid {
    Uuid::new_v5(&POINT_NAMESPACE, key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        Entity::new(
            "users::load_user_data",
            EntityType::Function,
            "/repo/users.py",
            LineSpan::new(10, 24),
        )
    }

    #[test]
    fn chunk_ids_are_stable_across_constructions() {
        let e = entity();
        let a = Chunk::metadata(&e, "sig".into(), true);
        let b = Chunk::metadata(&e, "different content".into(), true);
        assert_eq!(a.id, b.id, "id depends on identity, not content");
        assert_eq!(a.point_id(), b.point_id());
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn metadata_and_implementation_ids_differ() {
        let e = entity();
        let meta = Chunk::metadata(&e, "sig".into(), true);
        let imp = Chunk::implementation(&e, "def load_user_data(): ...".into());
        assert_ne!(meta.id, imp.id);
        assert_ne!(meta.point_id(), imp.point_id());
    }

    #[test]
    fn relation_key_includes_owner_file() {
        let r1 = Relation::new("a", "b", RelationType::Calls, "/repo/x.py");
        let r2 = Relation::new("a", "b", RelationType::Calls, "/repo/y.py");
        assert_ne!(r1.point_id(), r2.point_id());
    }
}
