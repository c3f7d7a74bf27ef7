// ABOUTME: Qdrant-backed VectorIndex over the official client
// ABOUTME: Payloads travel as JSON maps; filters compile to qdrant conditions

use crate::payload::{Point, PointFilter, PointPayload, PointType};
use crate::store::{Distance, ScrollPage, ScrolledPoint, SearchHit, VectorIndex};
use async_trait::async_trait;
use codemem_core::{IndexError, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Filter, PointStruct,
    PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    pub fn connect(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::Store(format!("qdrant connect: {e}")))?;
        info!("connected to qdrant at {}", url);
        Ok(Self { client })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        vector_dim: usize,
        distance: Distance,
    ) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| IndexError::Store(format!("list collections: {e}")))?;
        if collections.collections.iter().any(|c| c.name == name) {
            debug!("collection {} already exists", name);
            return Ok(());
        }
        info!("creating collection {} ({} dims)", name, vector_dim);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    vector_dim as u64,
                    to_qdrant_distance(distance),
                )),
            )
            .await
            .map_err(|e| IndexError::Store(format!("create collection {}: {e}", name)))?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| IndexError::Store(format!("drop collection {}: {e}", name)))?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = payload_to_map(&p.payload);
                PointStruct::new(p.id.to_string(), p.vector, payload)
            })
            .collect();
        self.client
            .upsert_points(qdrant_client::qdrant::UpsertPointsBuilder::new(
                name,
                qdrant_points,
            ))
            .await
            .map_err(|e| IndexError::Store(format!("upsert: {e}")))?;
        Ok(())
    }

    async fn delete(&self, name: &str, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<qdrant_client::qdrant::PointId> = ids
            .iter()
            .map(|id| qdrant_client::qdrant::PointId::from(id.to_string()))
            .collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(name).points(PointsIdsList { ids: point_ids }),
            )
            .await
            .map_err(|e| IndexError::Store(format!("delete: {e}")))?;
        Ok(())
    }

    async fn delete_by_filter(&self, name: &str, filter: &PointFilter) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(name).points(to_qdrant_filter(filter)))
            .await
            .map_err(|e| IndexError::Store(format!("delete by filter: {e}")))?;
        Ok(())
    }

    async fn scroll(
        &self,
        name: &str,
        filter: &PointFilter,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<ScrollPage> {
        let mut builder = ScrollPointsBuilder::new(name)
            .filter(to_qdrant_filter(filter))
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(false);
        if let Some(cursor) = cursor {
            builder = builder.offset(qdrant_client::qdrant::PointId::from(cursor.to_string()));
        }
        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| IndexError::Store(format!("scroll: {e}")))?;

        let mut points = Vec::new();
        for point in response.result {
            let Some(id) = point.id.as_ref().and_then(point_id_to_uuid) else {
                continue;
            };
            match map_to_payload(&point.payload) {
                Some(payload) => points.push(ScrolledPoint { id, payload }),
                None => debug!("skipping point {} with pre-migration payload", id),
            }
        }
        let next_cursor = response
            .next_page_offset
            .as_ref()
            .and_then(point_id_to_uuid);
        Ok(ScrollPage {
            points,
            next_cursor,
        })
    }

    async fn count(&self, name: &str, filter: &PointFilter) -> Result<usize> {
        let response = self
            .client
            .count(
                qdrant_client::qdrant::CountPointsBuilder::new(name)
                    .filter(to_qdrant_filter(filter))
                    .exact(true),
            )
            .await
            .map_err(|e| IndexError::Store(format!("count: {e}")))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let builder = SearchPointsBuilder::new(name, vector, limit as u64)
            .filter(to_qdrant_filter(filter))
            .with_payload(true);
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| IndexError::Store(format!("search: {e}")))?;

        let mut hits = Vec::new();
        for point in response.result {
            let Some(id) = point.id.as_ref().and_then(point_id_to_uuid) else {
                continue;
            };
            if let Some(payload) = map_to_payload(&point.payload) {
                hits.push(SearchHit {
                    id,
                    score: point.score,
                    payload,
                });
            }
        }
        Ok(hits)
    }
}

fn to_qdrant_distance(distance: Distance) -> qdrant_client::qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant_client::qdrant::Distance::Cosine,
        Distance::Euclid => qdrant_client::qdrant::Distance::Euclid,
        Distance::Dot => qdrant_client::qdrant::Distance::Dot,
    }
}

fn to_qdrant_filter(filter: &PointFilter) -> Filter {
    let mut must: Vec<Condition> = Vec::new();
    let mut should: Vec<Condition> = Vec::new();
    let mut must_not: Vec<Condition> = Vec::new();

    match filter.point_type {
        Some(PointType::Chunk) => must.push(Condition::matches("type", "chunk".to_string())),
        Some(PointType::Relation) => {
            must.push(Condition::matches("type", "relation".to_string()))
        }
        None => {}
    }
    if let Some(chunk_type) = &filter.chunk_type {
        must.push(Condition::matches("chunk_type", chunk_type.clone()));
    }
    if let Some(file_path) = &filter.file_path {
        must.push(Condition::matches("file_path", file_path.clone()));
    }
    if let Some(entity_name) = &filter.entity_name {
        must.push(Condition::matches("entity_name", entity_name.clone()));
    }
    if let Some(endpoint) = &filter.relation_endpoint {
        should.push(Condition::matches("from_entity", endpoint.clone()));
        should.push(Condition::matches("to_entity", endpoint.clone()));
    }
    if filter.automatic_only {
        must_not.push(Condition::is_empty("file_path"));
    }

    Filter {
        must,
        should,
        must_not,
        ..Default::default()
    }
}

fn payload_to_map(payload: &PointPayload) -> HashMap<String, qdrant_client::qdrant::Value> {
    let json = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
    match json {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_to_qdrant_value(v)))
            .collect(),
        _ => HashMap::new(),
    }
}

fn json_to_qdrant_value(value: serde_json::Value) -> qdrant_client::qdrant::Value {
    use qdrant_client::qdrant::value::Kind;
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(qdrant_client::qdrant::ListValue {
            values: items.into_iter().map(json_to_qdrant_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(qdrant_client::qdrant::Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    qdrant_client::qdrant::Value { kind: Some(kind) }
}

fn map_to_payload(map: &HashMap<String, qdrant_client::qdrant::Value>) -> Option<PointPayload> {
    let mut json = serde_json::Map::new();
    for (key, value) in map {
        json.insert(key.clone(), qdrant_value_to_json(value));
    }
    serde_json::from_value(serde_json::Value::Object(json)).ok()
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number((*i).into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(obj)) => {
            let mut map = serde_json::Map::new();
            for (k, v) in &obj.fields {
                map.insert(k.clone(), qdrant_value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

fn point_id_to_uuid(id: &qdrant_client::qdrant::PointId) -> Option<Uuid> {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match &id.point_id_options {
        Some(PointIdOptions::Uuid(s)) => Uuid::parse_str(s).ok(),
        Some(PointIdOptions::Num(_)) | None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemem_core::{Chunk, Entity, EntityType, LineSpan};

    #[test]
    fn payload_survives_map_roundtrip() {
        let entity = Entity::new(
            "users::load",
            EntityType::Function,
            "/repo/users.py",
            LineSpan::new(3, 9),
        );
        let chunk = Chunk::metadata(&entity, "def load()".to_string(), true);
        let payload = PointPayload::from_chunk(&chunk);

        let map = payload_to_map(&payload);
        let back = map_to_payload(&map).expect("payload parses back");
        assert_eq!(back, payload);
    }

    #[test]
    fn pre_migration_payloads_are_rejected() {
        // A chunk point without content_hash must not deserialize.
        let mut map = HashMap::new();
        map.insert(
            "type".to_string(),
            qdrant_client::qdrant::Value::from("chunk"),
        );
        map.insert(
            "content".to_string(),
            qdrant_client::qdrant::Value::from("legacy"),
        );
        assert!(map_to_payload(&map).is_none());
    }

    #[test]
    fn filters_compile_to_conditions() {
        let filter = PointFilter::relations()
            .with_file_path("/repo/a.py")
            .with_endpoint("users::load");
        let qdrant_filter = to_qdrant_filter(&filter);
        assert_eq!(qdrant_filter.must.len(), 2);
        assert_eq!(qdrant_filter.should.len(), 2);

        let manual_excluding = to_qdrant_filter(&PointFilter::new().automatic_only());
        assert_eq!(manual_excluding.must_not.len(), 1);
    }
}
