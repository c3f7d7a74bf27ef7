// ABOUTME: In-memory VectorIndex used by tests and the orchestrator's unit coverage
// ABOUTME: Also tracks mutation counters so minimality invariants are checkable

use crate::payload::{Point, PointFilter, PointPayload};
use crate::store::{Distance, ScrollPage, ScrolledPoint, SearchHit, VectorIndex};
use async_trait::async_trait;
use codemem_core::{IndexError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

struct Collection {
    vector_dim: usize,
    points: BTreeMap<Uuid, (Vec<f32>, PointPayload)>,
}

/// Counters for asserting minimality properties (exact upsert and delete
/// volumes) in tests.
#[derive(Debug, Default)]
pub struct MemoryIndexStats {
    pub upserted_points: AtomicU64,
    pub deleted_points: AtomicU64,
    pub upsert_calls: AtomicU64,
}

#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
    stats: MemoryIndexStats,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &MemoryIndexStats {
        &self.stats
    }

    pub fn reset_stats(&self) {
        self.stats.upserted_points.store(0, Ordering::SeqCst);
        self.stats.deleted_points.store(0, Ordering::SeqCst);
        self.stats.upsert_calls.store(0, Ordering::SeqCst);
    }

    pub fn insert_manual(&self, name: &str, id: Uuid, vector: Vec<f32>, payload: PointPayload) {
        let mut collections = self.collections.write();
        if let Some(collection) = collections.get_mut(name) {
            collection.points.insert(id, (vector, payload));
        }
    }

    pub fn get_payload(&self, name: &str, id: Uuid) -> Option<PointPayload> {
        self.collections
            .read()
            .get(name)
            .and_then(|c| c.points.get(&id))
            .map(|(_, p)| p.clone())
    }

    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Collection) -> T,
    ) -> Result<T> {
        let collections = self.collections.read();
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::Store(format!("collection {} does not exist", name)))?;
        Ok(f(collection))
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        vector_dim: usize,
        _distance: Distance,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if existing.vector_dim != vector_dim {
                return Err(IndexError::Store(format!(
                    "collection {} has dimension {}, requested {}",
                    name, existing.vector_dim, vector_dim
                )));
            }
            return Ok(());
        }
        collections.insert(
            name.to_string(),
            Collection {
                vector_dim,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::Store(format!("collection {} does not exist", name)))?;
        self.stats.upsert_calls.fetch_add(1, Ordering::SeqCst);
        for point in points {
            if point.vector.len() != collection.vector_dim {
                return Err(IndexError::Store(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    collection.vector_dim
                )));
            }
            self.stats.upserted_points.fetch_add(1, Ordering::SeqCst);
            collection.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn delete(&self, name: &str, ids: &[Uuid]) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::Store(format!("collection {} does not exist", name)))?;
        for id in ids {
            if collection.points.remove(id).is_some() {
                self.stats.deleted_points.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn delete_by_filter(&self, name: &str, filter: &PointFilter) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::Store(format!("collection {} does not exist", name)))?;
        let doomed: Vec<Uuid> = collection
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.matches(payload))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            collection.points.remove(id);
            self.stats.deleted_points.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn scroll(
        &self,
        name: &str,
        filter: &PointFilter,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<ScrollPage> {
        self.with_collection(name, |collection| {
            let mut points = Vec::new();
            let mut next_cursor = None;
            let iter: Box<dyn Iterator<Item = (&Uuid, &(Vec<f32>, PointPayload))> + '_> =
                match cursor {
                    Some(from) => Box::new(
                        collection
                            .points
                            .range(from..)
                            .skip_while(move |(id, _)| *id == &from),
                    ),
                    None => Box::new(collection.points.iter()),
                };
            for (id, (_, payload)) in iter {
                if !filter.matches(payload) {
                    continue;
                }
                if points.len() == limit {
                    next_cursor = Some(*id);
                    break;
                }
                points.push(ScrolledPoint {
                    id: *id,
                    payload: payload.clone(),
                });
            }
            // Cursor is the last returned point; the next page resumes
            // after it.
            if next_cursor.is_some() {
                next_cursor = points.last().map(|p| p.id);
            }
            ScrollPage {
                points,
                next_cursor,
            }
        })
    }

    async fn count(&self, name: &str, filter: &PointFilter) -> Result<usize> {
        self.with_collection(name, |collection| {
            collection
                .points
                .values()
                .filter(|(_, payload)| filter.matches(payload))
                .count()
        })
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.with_collection(name, |collection| {
            let mut hits: Vec<SearchHit> = collection
                .points
                .iter()
                .filter(|(_, (_, payload))| filter.matches(payload))
                .map(|(id, (stored, payload))| SearchHit {
                    id: *id,
                    score: cosine(&vector, stored),
                    payload: payload.clone(),
                })
                .collect();
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(limit);
            hits
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::scroll_all;
    use codemem_core::{Chunk, Entity, EntityType, LineSpan};

    fn chunk_point(name: &str, file: &str, content: &str) -> Point {
        let entity = Entity::new(name, EntityType::Function, file, LineSpan::new(1, 3));
        let chunk = Chunk::metadata(&entity, content.to_string(), false);
        Point::for_chunk(&chunk, vec![1.0, 0.0])
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let index = MemoryIndex::new();
        index
            .ensure_collection("c", 2, Distance::Cosine)
            .await
            .unwrap();
        let point = chunk_point("a::f", "/r/a.py", "sig");
        index.upsert("c", vec![point.clone()]).await.unwrap();
        index.upsert("c", vec![point]).await.unwrap();
        assert_eq!(index.count("c", &PointFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = MemoryIndex::new();
        index
            .ensure_collection("c", 4, Distance::Cosine)
            .await
            .unwrap();
        let err = index
            .upsert("c", vec![chunk_point("a::f", "/r/a.py", "sig")])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        let err = index
            .ensure_collection("c", 8, Distance::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
    }

    #[tokio::test]
    async fn delete_by_filter_scopes_to_file() {
        let index = MemoryIndex::new();
        index
            .ensure_collection("c", 2, Distance::Cosine)
            .await
            .unwrap();
        index
            .upsert(
                "c",
                vec![
                    chunk_point("a::f", "/r/a.py", "one"),
                    chunk_point("b::g", "/r/b.py", "two"),
                ],
            )
            .await
            .unwrap();
        index
            .delete_by_filter("c", &PointFilter::new().with_file_path("/r/a.py"))
            .await
            .unwrap();
        assert_eq!(index.count("c", &PointFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scroll_pages_cover_everything_exactly_once() {
        let index = MemoryIndex::new();
        index
            .ensure_collection("c", 2, Distance::Cosine)
            .await
            .unwrap();
        let points: Vec<Point> = (0..25)
            .map(|i| chunk_point(&format!("m::f{i}"), "/r/m.py", &format!("sig {i}")))
            .collect();
        index.upsert("c", points).await.unwrap();

        let mut seen = std::collections::HashSet::new();
        let mut cursor = None;
        loop {
            let page = index
                .scroll("c", &PointFilter::new(), cursor, 7)
                .await
                .unwrap();
            for p in &page.points {
                assert!(seen.insert(p.id), "no point appears twice");
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len(), 25);

        let all = scroll_all(&index, "c", &PointFilter::new()).await.unwrap();
        assert_eq!(all.len(), 25);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let index = MemoryIndex::new();
        index
            .ensure_collection("c", 2, Distance::Cosine)
            .await
            .unwrap();
        let near = chunk_point("a::near", "/r/a.py", "near");
        let mut far = chunk_point("a::far", "/r/a.py", "far");
        far.vector = vec![0.0, 1.0];
        index.upsert("c", vec![near, far]).await.unwrap();

        let hits = index
            .search("c", vec![1.0, 0.1], &PointFilter::new(), 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        match &hits[0].payload {
            PointPayload::Chunk(c) => assert_eq!(c.entity_name, "a::near"),
            _ => panic!("expected chunk"),
        }
    }

    #[tokio::test]
    async fn missing_collection_is_a_store_error() {
        let index = MemoryIndex::new();
        let err = index.count("nope", &PointFilter::new()).await.unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
    }
}
