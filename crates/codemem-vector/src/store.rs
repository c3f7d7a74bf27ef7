use crate::payload::{Point, PointFilter, PointPayload};
use async_trait::async_trait;
use codemem_core::Result;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Euclid,
    Dot,
}

#[derive(Debug, Clone)]
pub struct ScrolledPoint {
    pub id: Uuid,
    pub payload: PointPayload,
}

#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub points: Vec<ScrolledPoint>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: PointPayload,
}

/// Typed key-value store over points with payload filters. All collection
/// mutations flow through this seam; implementations must tolerate
/// concurrent writers (idempotent upserts by id, filter-scoped deletes).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent create. The dimension is fixed for the collection's
    /// lifetime; switching embedding providers requires a new collection.
    async fn ensure_collection(&self, name: &str, vector_dim: usize, distance: Distance)
        -> Result<()>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()>;

    async fn delete(&self, name: &str, ids: &[Uuid]) -> Result<()>;

    async fn delete_by_filter(&self, name: &str, filter: &PointFilter) -> Result<()>;

    /// Paged enumeration ordered by point id. The cursor is an opaque
    /// continuation token: feed the returned value back to get the next
    /// page.
    async fn scroll(
        &self,
        name: &str,
        filter: &PointFilter,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<ScrollPage>;

    async fn count(&self, name: &str, filter: &PointFilter) -> Result<usize>;

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;
}

/// Drain every matching point through repeated scroll pages.
pub async fn scroll_all(
    index: &dyn VectorIndex,
    name: &str,
    filter: &PointFilter,
) -> Result<Vec<ScrolledPoint>> {
    let mut all = Vec::new();
    let mut cursor = None;
    loop {
        let page = index.scroll(name, filter, cursor, 512).await?;
        all.extend(page.points);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(all)
}
