// ABOUTME: Read-only graph projections over stored points
// ABOUTME: Global paged view and entity-centric neighborhoods for search consumers

use codemem_core::Result;
use codemem_vector::{
    scroll_all, ChunkPayload, PointFilter, PointPayload, RelationPayload, VectorIndex,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Entity node as consumers see it: the metadata chunk, minus the vector.
#[derive(Debug, Clone, Serialize)]
pub struct EntityNode {
    pub name: String,
    pub entity_type: String,
    pub file_path: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub summary: String,
    pub has_implementation: bool,
}

impl From<ChunkPayload> for EntityNode {
    fn from(chunk: ChunkPayload) -> Self {
        Self {
            name: chunk.entity_name,
            entity_type: chunk.entity_type,
            file_path: chunk.file_path,
            line_start: chunk.line_start,
            line_end: chunk.line_end,
            summary: chunk.content,
            has_implementation: chunk.has_implementation.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationEdge {
    pub from_entity: String,
    pub to_entity: String,
    pub relation_type: String,
    pub file_path: String,
}

impl From<RelationPayload> for RelationEdge {
    fn from(relation: RelationPayload) -> Self {
        Self {
            from_entity: relation.from_entity,
            to_entity: relation.to_entity,
            relation_type: relation.relation_type,
            file_path: relation.file_path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalGraphPage {
    pub entities: Vec<EntityNode>,
    pub relations: Vec<RelationEdge>,
    #[serde(skip)]
    pub next_entities: Option<Uuid>,
    #[serde(skip)]
    pub next_relations: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityGraph {
    pub root: Option<EntityNode>,
    pub relations: Vec<RelationEdge>,
    pub neighbors: Vec<EntityNode>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphFilters {
    pub entity_type: Option<String>,
    pub relation_type: Option<String>,
}

pub struct GraphView {
    store: Arc<dyn VectorIndex>,
    collection: String,
}

impl GraphView {
    pub fn new(store: Arc<dyn VectorIndex>, collection: String) -> Self {
        Self { store, collection }
    }

    /// One page of the global projection. Type filters are applied after
    /// the scroll since they are advisory narrowing, not payload keys.
    pub async fn global_page(
        &self,
        filters: &GraphFilters,
        entity_cursor: Option<Uuid>,
        relation_cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<GlobalGraphPage> {
        let entity_page = self
            .store
            .scroll(
                &self.collection,
                &PointFilter::chunks()
                    .with_chunk_type("metadata")
                    .automatic_only(),
                entity_cursor,
                limit,
            )
            .await?;
        let relation_page = self
            .store
            .scroll(
                &self.collection,
                &PointFilter::relations(),
                relation_cursor,
                limit,
            )
            .await?;

        let entities = entity_page
            .points
            .into_iter()
            .filter_map(|p| match p.payload {
                PointPayload::Chunk(chunk) => Some(EntityNode::from(chunk)),
                _ => None,
            })
            .filter(|node| {
                filters
                    .entity_type
                    .as_ref()
                    .map_or(true, |t| &node.entity_type == t)
            })
            .collect();
        let relations = relation_page
            .points
            .into_iter()
            .filter_map(|p| match p.payload {
                PointPayload::Relation(relation) => Some(RelationEdge::from(relation)),
                _ => None,
            })
            .filter(|edge| {
                filters
                    .relation_type
                    .as_ref()
                    .map_or(true, |t| &edge.relation_type == t)
            })
            .collect();

        Ok(GlobalGraphPage {
            entities,
            relations,
            next_entities: entity_page.next_cursor,
            next_relations: relation_page.next_cursor,
        })
    }

    /// The neighborhood of one entity: its metadata chunk, every relation
    /// touching it, and neighbor metadata within `depth` hops (1 or 2).
    pub async fn entity_graph(&self, name: &str, depth: usize) -> Result<EntityGraph> {
        let root = self.metadata_of(name).await?;

        let mut frontier: HashSet<String> = HashSet::from([name.to_string()]);
        let mut visited: HashSet<String> = frontier.clone();
        let mut relations: Vec<RelationEdge> = Vec::new();
        let mut relation_keys: HashSet<(String, String, String)> = HashSet::new();
        let mut neighbor_names: HashSet<String> = HashSet::new();

        for _ in 0..depth.clamp(1, 2) {
            let mut next_frontier = HashSet::new();
            for entity in &frontier {
                let touching = scroll_all(
                    self.store.as_ref(),
                    &self.collection,
                    &PointFilter::relations().with_endpoint(entity.clone()),
                )
                .await?;
                for point in touching {
                    let PointPayload::Relation(relation) = point.payload else {
                        continue;
                    };
                    let key = (
                        relation.from_entity.clone(),
                        relation.to_entity.clone(),
                        relation.relation_type.clone(),
                    );
                    if relation_keys.insert(key) {
                        for endpoint in [&relation.from_entity, &relation.to_entity] {
                            if !visited.contains(endpoint) {
                                neighbor_names.insert(endpoint.clone());
                                next_frontier.insert(endpoint.clone());
                            }
                        }
                        relations.push(RelationEdge::from(relation));
                    }
                }
            }
            visited.extend(next_frontier.iter().cloned());
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        let mut neighbors = Vec::new();
        for neighbor in neighbor_names {
            if let Some(node) = self.metadata_of(&neighbor).await? {
                neighbors.push(node);
            }
        }
        neighbors.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(EntityGraph {
            root,
            relations,
            neighbors,
        })
    }

    async fn metadata_of(&self, name: &str) -> Result<Option<EntityNode>> {
        let page = self
            .store
            .scroll(
                &self.collection,
                &PointFilter::chunks()
                    .with_chunk_type("metadata")
                    .with_entity_name(name),
                None,
                1,
            )
            .await?;
        Ok(page.points.into_iter().find_map(|p| match p.payload {
            PointPayload::Chunk(chunk) => Some(EntityNode::from(chunk)),
            _ => None,
        }))
    }
}
