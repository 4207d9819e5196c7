//! SQLite document search and session archive tests

mod helpers;

use helpers::{catalog, seeded_pool};
use onboard_sim::db::{init_database_pool, SessionStore, SqliteDocumentStore, SqliteSessionStore};
use onboard_sim::models::{CompetencyEvaluation, SimulationSession};
use onboard_sim::services::{DocumentSearch, SearchRequest};

fn request(query: &str, keywords: &[&str]) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        limit: 10,
        ..SearchRequest::default()
    }
}

#[tokio::test]
async fn exact_title_ranks_above_keyword_matches() {
    let store = SqliteDocumentStore::new(seeded_pool().await);

    let hits = store.search(&request("위임장 양식", &["위임장", "양식"])).await.unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].document_id, "doc-proxy-form");
    assert_eq!(hits[0].similarity, 0.95);
    // Both chunks of the document, each once
    let proxy: Vec<i64> = hits
        .iter()
        .filter(|c| c.document_id == "doc-proxy-form")
        .map(|c| c.chunk_index)
        .collect();
    assert_eq!(proxy, vec![0, 1]);
}

#[tokio::test]
async fn keyword_stages_assign_stage_similarity() {
    let store = SqliteDocumentStore::new(seeded_pool().await);

    let hits = store.search(&request("중도해지 이율", &["중도해지"])).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "doc-term-deposit");
    assert_eq!(hits[0].chunk_index, 1);
    assert_eq!(hits[0].similarity, 0.6);

    let hits = store.search(&request("예금자보호 한도", &["예금자보호"])).await.unwrap();
    assert_eq!(hits[0].document_id, "doc-protection");
    assert_eq!(hits[0].similarity, 0.8);
}

#[tokio::test]
async fn restriction_filters_titles_and_categories() {
    let store = SqliteDocumentStore::new(seeded_pool().await);

    let mut restricted = request("정기예금 금리", &["정기예금", "금리"]);
    restricted.categories = vec!["compliance".to_string()];
    let hits = store.search(&restricted).await.unwrap();
    assert!(hits.iter().all(|c| c.category == "compliance"));

    restricted.categories.clear();
    restricted.titles = vec!["정기예금 상품설명서".to_string()];
    let hits = store.search(&restricted).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|c| c.title == "정기예금 상품설명서"));
}

#[tokio::test]
async fn limit_is_respected() {
    let store = SqliteDocumentStore::new(seeded_pool().await);

    let mut req = request("원", &["정기예금", "위임장", "대출", "예금자보호"]);
    req.limit = 2;
    let hits = store.search(&req).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn list_titles_is_distinct_and_sorted() {
    let store = SqliteDocumentStore::new(seeded_pool().await);

    let titles = store.list_titles().await.unwrap();
    let mut sorted = titles.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(titles, sorted);
    assert_eq!(titles.len(), 4);
}

fn completed_session() -> SimulationSession {
    let catalog = catalog();
    let persona = catalog.persona("elderly-depositor").unwrap().clone();
    let situation = catalog.situation("term-deposit-signup").unwrap().clone();
    serde_json::from_value(serde_json::json!({
        "session_id": uuid::Uuid::new_v4(),
        "user_id": "trainee-9",
        "persona": persona,
        "situation": situation,
        "state": "COMPLETED",
        "turns": [
            {"role": "customer", "text": "예금 들려고요.", "timestamp": "2026-01-05T09:00:00Z"},
            {"role": "employee", "text": "네, 얼마를 생각하세요?", "timestamp": "2026-01-05T09:00:10Z"}
        ],
        "achieved_goals": [0],
        "stuck_counter": 0,
        "should_close": false,
        "started_at": "2026-01-05T09:00:00Z",
        "ended_at": "2026-01-05T09:05:00Z"
    }))
    .unwrap()
}

#[tokio::test]
async fn completed_session_round_trips_through_archive() {
    let pool = seeded_pool().await;
    let store = SqliteSessionStore::new(pool, 1_000);
    let session = completed_session();
    let evaluation = CompetencyEvaluation::neutral_default();

    store.save_completed(&session, &evaluation).await.unwrap();
    // Saving again upserts
    store.save_completed(&session, &evaluation).await.unwrap();

    let stored = store.load_session(session.session_id).await.unwrap().unwrap();
    assert_eq!(stored.user_id, "trainee-9");
    assert_eq!(stored.state, "COMPLETED");
    assert_eq!(stored.turns, session.turns());
    assert_eq!(stored.achieved_goals, vec![0]);
    assert_eq!(stored.duration_seconds, 300);

    let loaded = store.load_evaluation(session.session_id).await.unwrap().unwrap();
    assert_eq!(loaded, evaluation);
}

#[tokio::test]
async fn missing_session_loads_none() {
    let store = SqliteSessionStore::new(seeded_pool().await, 1_000);
    let id = uuid::Uuid::new_v4();
    assert!(store.load_session(id).await.unwrap().is_none());
    assert!(store.load_evaluation(id).await.unwrap().is_none());
}

#[tokio::test]
async fn file_database_is_created_with_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("onboard.db");

    let pool = init_database_pool(&path).await.unwrap();
    assert!(path.exists());

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
    for table in ["competency_evaluations", "document_chunks", "simulation_sessions"] {
        assert!(tables.iter().any(|t| t == table), "missing table {}", table);
    }
}
