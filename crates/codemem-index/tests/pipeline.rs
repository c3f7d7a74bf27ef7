// End-to-end pipeline scenarios over the in-memory store with a
// deterministic stub embedding provider.

use async_trait::async_trait;
use codemem_core::{content_hash, EmbeddingProviderKind, IndexerConfig};
use codemem_index::{ClearMode, GraphView, IndexOptions, Indexer};
use codemem_parser::ParserRegistry;
use codemem_vector::{
    BatchLimits, ChunkPayload, CostLedger, EmbeddingCoordinator, EmbeddingProvider,
    EmbeddingResponse, HeuristicTokenCounter, MemoryIndex, PointFilter, PointPayload,
    ProviderCallError, TokenCounter, VectorIndex,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const DIM: usize = 8;

struct StubProvider {
    counter: HeuristicTokenCounter,
    requests: AtomicU64,
    poison: Option<String>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            counter: HeuristicTokenCounter,
            requests: AtomicU64::new(0),
            poison: None,
        }
    }

    fn poisoned(marker: &str) -> Self {
        Self {
            poison: Some(marker.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }
    fn model(&self) -> &str {
        "text-embedding-3-small"
    }
    fn dimension(&self) -> usize {
        DIM
    }
    fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_tokens: 100_000,
            max_items: 512,
        }
    }
    fn token_counter(&self) -> &dyn TokenCounter {
        &self.counter
    }

    async fn embed(
        &self,
        texts: &[String],
    ) -> std::result::Result<EmbeddingResponse, ProviderCallError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(poison) = &self.poison {
            if texts.iter().any(|t| t.contains(poison)) {
                return Err(ProviderCallError::hard("provider outage"));
            }
        }
        let vectors = texts
            .iter()
            .map(|t| {
                let seed = t.bytes().fold(1.0f32, |acc, b| acc + b as f32);
                (0..DIM).map(|i| seed + i as f32).collect()
            })
            .collect();
        Ok(EmbeddingResponse {
            vectors,
            prompt_tokens: texts.iter().map(|t| t.len() / 4 + 1).sum(),
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    memory: Arc<MemoryIndex>,
    indexer: Indexer,
    provider: Arc<StubProvider>,
}

fn fixture_with_provider(provider: StubProvider) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let memory = Arc::new(MemoryIndex::new());
    let provider = Arc::new(provider);

    let config = IndexerConfig {
        embedding_provider: EmbeddingProviderKind::OpenAi,
        embedding_model: "text-embedding-3-small".to_string(),
        embedding_api_key: "test".to_string(),
        vector_store_url: String::new(),
        vector_store_api_key: None,
        include_patterns: Vec::new(),
        exclude_patterns: Vec::new(),
        max_file_size: 1_048_576,
        streaming_threshold: 2_097_152,
        max_concurrent_files: 4,
        file_deadline_secs: 60,
    };
    let coordinator = Arc::new(EmbeddingCoordinator::new(
        Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
        EmbeddingProviderKind::OpenAi,
        Arc::new(CostLedger::new()),
    ));
    let indexer = Indexer::new(
        config,
        root.clone(),
        Arc::new(ParserRegistry::default()),
        coordinator,
        Arc::clone(&memory) as Arc<dyn VectorIndex>,
    );
    Fixture {
        _dir: dir,
        root,
        memory,
        indexer,
        provider,
    }
}

fn fixture() -> Fixture {
    fixture_with_provider(StubProvider::new())
}

const A_PY: &str = r#"class Greeter:
    def __init__(self, name):
        self.name = name

    def hello(self):
        return "hi " + self.name

    def wave(self):
        return "wave"


def load_user_data(path):
    return path
"#;

const B_PY: &str = r#"from a import load_user_data


def fetch():
    return load_user_data("x")


def helper():
    return 1
"#;

fn write(fixture: &Fixture, name: &str, content: &str) {
    std::fs::write(fixture.root.join(name), content).unwrap();
}

async fn run(fixture: &Fixture) -> codemem_index::IndexReport {
    fixture
        .indexer
        .run(&IndexOptions::new("mem"))
        .await
        .unwrap()
}

async fn count(fixture: &Fixture, filter: &PointFilter) -> usize {
    fixture.memory.count("mem", filter).await.unwrap()
}

async fn metadata_names(fixture: &Fixture) -> Vec<String> {
    let all = codemem_vector::scroll_all(
        fixture.memory.as_ref(),
        "mem",
        &PointFilter::chunks().with_chunk_type("metadata"),
    )
    .await
    .unwrap();
    let mut names: Vec<String> = all
        .into_iter()
        .filter_map(|p| match p.payload {
            PointPayload::Chunk(c) => Some(c.entity_name),
            _ => None,
        })
        .collect();
    names.sort();
    names
}

fn insert_manual(fixture: &Fixture) -> Uuid {
    let id = Uuid::new_v4();
    fixture.memory.insert_manual(
        "mem",
        id,
        vec![0.5; DIM],
        PointPayload::Chunk(ChunkPayload {
            chunk_type: "metadata".to_string(),
            entity_name: "team-decision".to_string(),
            entity_type: "manual_note".to_string(),
            file_path: None,
            line_start: 0,
            line_end: 0,
            content: "We ship on Fridays.".to_string(),
            content_hash: content_hash("We ship on Fridays."),
            has_implementation: Some(false),
            semantic_metadata: None,
        }),
    );
    id
}

#[tokio::test]
async fn s1_baseline_full_index() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);

    let report = run(&fixture).await;
    assert_eq!(report.operation, "full");
    assert_eq!(report.files_indexed, 2);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.exit_code(), 0);

    // a.py: file + class + 3 methods + function = 6 entities.
    // b.py: file + 2 functions = 3 entities. One metadata chunk each.
    let metadata = count(&fixture, &PointFilter::chunks().with_chunk_type("metadata")).await;
    assert_eq!(metadata, 9);

    // Everything except the two file entities has a body.
    let implementation =
        count(&fixture, &PointFilter::chunks().with_chunk_type("implementation")).await;
    assert_eq!(implementation, 7);

    // The from-import surfaces as an imports relation to the qualified name.
    let relations = codemem_vector::scroll_all(
        fixture.memory.as_ref(),
        "mem",
        &PointFilter::relations(),
    )
    .await
    .unwrap();
    let imports: Vec<_> = relations
        .iter()
        .filter_map(|p| match &p.payload {
            PointPayload::Relation(r) if r.relation_type == "imports" => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].to_entity, "a::load_user_data");

    let class_contains = relations
        .iter()
        .filter(|p| match &p.payload {
            PointPayload::Relation(r) => {
                r.relation_type == "contains" && r.from_entity == "a::Greeter"
            }
            _ => false,
        })
        .count();
    assert_eq!(class_contains, 3, "class contains each method");

    // The resolved cross-file call is also present.
    assert!(relations.iter().any(|p| match &p.payload {
        PointPayload::Relation(r) =>
            r.relation_type == "calls"
                && r.from_entity == "b::fetch"
                && r.to_entity == "a::load_user_data",
        _ => false,
    }));
}

#[tokio::test]
async fn idempotent_rerun_does_nothing() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);
    run(&fixture).await;

    fixture.memory.reset_stats();
    let report = run(&fixture).await;
    assert_eq!(report.operation, "incremental");
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.chunks_upserted, 0);
    assert_eq!(report.chunks_deleted, 0);
    assert_eq!(report.prompt_tokens, 0, "no-op run embeds nothing");
    assert_eq!(
        fixture.memory.stats().upserted_points.load(Ordering::SeqCst),
        0
    );
    assert_eq!(
        fixture.memory.stats().deleted_points.load(Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn s2_single_method_modification_is_minimal() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);
    run(&fixture).await;

    // Remember an untouched chunk's hash for the stability assertion.
    let before = metadata_names(&fixture).await;

    let requests_before = fixture.provider.requests.load(Ordering::SeqCst);
    write(
        &fixture,
        "a.py",
        &A_PY.replace("return \"wave\"", "return self.hello()"),
    );
    let report = run(&fixture).await;

    // Only wave's metadata and implementation chunks changed.
    assert_eq!(report.chunks_upserted, 2);
    assert_eq!(report.chunks_deleted, 0);
    assert!(report.chunks_unchanged >= 4);
    // One batched embedding request covers the changed chunks plus the
    // file's rewritten relations.
    assert_eq!(
        fixture.provider.requests.load(Ordering::SeqCst) - requests_before,
        1
    );
    assert_eq!(metadata_names(&fixture).await, before);
}

#[tokio::test]
async fn s3_deleting_a_function_sweeps_cross_file_references() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);
    run(&fixture).await;

    assert!(metadata_names(&fixture)
        .await
        .contains(&"a::load_user_data".to_string()));

    // Remove the function from a.py; b.py is untouched.
    let without_fn = A_PY
        .replace("\n\ndef load_user_data(path):\n    return path\n", "\n");
    write(&fixture, "a.py", &without_fn);
    let report = run(&fixture).await;
    assert_eq!(report.files_indexed, 1, "only a.py reprocessed");

    let names = metadata_names(&fixture).await;
    assert!(!names.contains(&"a::load_user_data".to_string()));
    assert!(names.contains(&"b::fetch".to_string()), "b.py untouched");

    // Both the import and the resolved call from b.py referenced the dead
    // entity; the sweep removed them.
    let dangling = count(
        &fixture,
        &PointFilter::relations().with_endpoint("a::load_user_data"),
    )
    .await;
    assert_eq!(dangling, 0);
    assert!(report.orphans_removed >= 1);
}

#[tokio::test]
async fn s4_force_reembeds_everything_without_net_changes() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    run(&fixture).await;
    let manual_id = insert_manual(&fixture);

    let hashes_before: Vec<String> = codemem_vector::scroll_all(
        fixture.memory.as_ref(),
        "mem",
        &PointFilter::chunks(),
    )
    .await
    .unwrap()
    .into_iter()
    .map(|p| p.payload.content_hash().to_string())
    .collect();

    let mut options = IndexOptions::new("mem");
    options.force = true;
    let report = fixture.indexer.run(&options).await.unwrap();

    assert_eq!(report.files_indexed, 1);
    assert!(report.chunks_upserted >= 6, "every chunk re-embedded");
    assert_eq!(report.chunks_deleted, 0);

    let mut hashes_after: Vec<String> = codemem_vector::scroll_all(
        fixture.memory.as_ref(),
        "mem",
        &PointFilter::chunks(),
    )
    .await
    .unwrap()
    .into_iter()
    .map(|p| p.payload.content_hash().to_string())
    .collect();
    let mut hashes_before = hashes_before;
    hashes_before.sort();
    hashes_after.sort();
    assert_eq!(hashes_before, hashes_after, "hashes identical after force");
    assert!(fixture.memory.get_payload("mem", manual_id).is_some());
}

#[tokio::test]
async fn s5_provider_outage_rolls_back_only_the_failing_file() {
    let fixture = fixture_with_provider(StubProvider::poisoned("poisoned_function"));
    write(&fixture, "a.py", A_PY);
    write(
        &fixture,
        "b.py",
        "def poisoned_function():\n    return 1\n",
    );

    let report = run(&fixture).await;
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "embedding");

    // File 1 is fully present, file 2 left no partial points.
    assert!(metadata_names(&fixture)
        .await
        .contains(&"a::Greeter".to_string()));
    let b_path = fixture.root.join("b.py").to_string_lossy().into_owned();
    let b_points = count(&fixture, &PointFilter::new().with_file_path(b_path.clone())).await;
    assert_eq!(b_points, 0, "no partial updates for the failed file");

    // The snapshot only records file 1, so the next run retries file 2.
    let snapshot = codemem_index::SnapshotStore::new(&fixture.root, "mem").load();
    assert!(snapshot.files.keys().any(|k| k.ends_with("a.py")));
    assert!(!snapshot.files.keys().any(|k| k.ends_with("b.py")));
}

#[tokio::test]
async fn s6_clear_preserves_manual_clear_all_does_not() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    run(&fixture).await;
    let manual_id = insert_manual(&fixture);

    let mut options = IndexOptions::new("mem");
    options.clear = ClearMode::PreserveManual;
    fixture.indexer.run(&options).await.unwrap();

    assert!(
        fixture.memory.get_payload("mem", manual_id).is_some(),
        "--clear keeps manual records"
    );
    // The project was re-indexed from scratch afterwards.
    assert!(count(&fixture, &PointFilter::chunks().automatic_only()).await > 0);

    let mut options = IndexOptions::new("mem");
    options.clear = ClearMode::All;
    fixture.indexer.run(&options).await.unwrap();
    assert!(
        fixture.memory.get_payload("mem", manual_id).is_none(),
        "--clear-all erases manual records too"
    );
}

#[tokio::test]
async fn deleted_file_leaves_no_points_behind() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);
    run(&fixture).await;

    let a_path = fixture.root.join("a.py").to_string_lossy().into_owned();
    std::fs::remove_file(fixture.root.join("a.py")).unwrap();
    let report = run(&fixture).await;

    let remaining = count(&fixture, &PointFilter::new().with_file_path(a_path)).await;
    assert_eq!(remaining, 0);
    assert!(report.chunks_deleted > 0);

    // b.py's import now points at nothing internal; the sweep removed it.
    let dangling = count(
        &fixture,
        &PointFilter::relations().with_endpoint("a::load_user_data"),
    )
    .await;
    assert_eq!(dangling, 0);
}

#[tokio::test]
async fn manual_records_survive_every_non_clear_run() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    run(&fixture).await;
    let manual_id = insert_manual(&fixture);

    write(&fixture, "a.py", &A_PY.replace("wave", "salute"));
    run(&fixture).await;
    std::fs::remove_file(fixture.root.join("a.py")).unwrap();
    run(&fixture).await;

    let mut options = IndexOptions::new("mem");
    options.force = true;
    fixture.indexer.run(&options).await.unwrap();

    assert!(
        fixture.memory.get_payload("mem", manual_id).is_some(),
        "manual record untouched across modify, delete, and force runs"
    );
}

#[tokio::test]
async fn touched_but_identical_file_embeds_nothing() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    run(&fixture).await;

    // Trailing whitespace changes size and mtime but not the normalized
    // content hash: the file short-circuits before parsing.
    write(&fixture, "a.py", &A_PY.replace("return path", "return path  "));
    let report = run(&fixture).await;
    assert_eq!(report.chunks_upserted, 0);
    assert_eq!(report.prompt_tokens, 0);
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_skipped, 1);
}

#[tokio::test]
async fn parse_failure_retains_existing_points() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    run(&fixture).await;
    let metadata_before = count(&fixture, &PointFilter::chunks()).await;

    // Invalid UTF-8 makes the parser fail outright.
    std::fs::write(fixture.root.join("a.py"), [0xFF, 0xFE, 0x00]).unwrap();
    let report = run(&fixture).await;
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.failures[0].kind, "parse");
    assert_eq!(
        count(&fixture, &PointFilter::chunks()).await,
        metadata_before,
        "stale points kept for partial search utility"
    );
}

#[tokio::test]
async fn graph_views_reflect_the_store() {
    let fixture = fixture();
    write(&fixture, "a.py", A_PY);
    write(&fixture, "b.py", B_PY);
    run(&fixture).await;

    let view = GraphView::new(
        Arc::clone(&fixture.memory) as Arc<dyn VectorIndex>,
        "mem".to_string(),
    );

    let page = view
        .global_page(&Default::default(), None, None, 100)
        .await
        .unwrap();
    assert_eq!(page.entities.len(), 9);
    assert!(!page.relations.is_empty());

    let graph = view.entity_graph("a::load_user_data", 1).await.unwrap();
    let root = graph.root.expect("root entity present");
    assert_eq!(root.entity_type, "function");
    assert!(graph.relations.iter().any(|r| r.relation_type == "imports"));
    assert!(graph
        .neighbors
        .iter()
        .any(|n| n.name == "b::fetch"), "caller appears as neighbor");
}
