//! Keyword search over stored reference chunks
//!
//! Stages run in order and stop once the limit is reached:
//! 1. Exact title match (title candidates or the whole query) → 0.95
//! 2. Keyword contained in the title → 0.8
//! 3. Keyword contained in the content → 0.6
//!
//! The similarities are fixed placeholders per stage; a vector-backed
//! collaborator would supply real scores through the same trait.

use async_trait::async_trait;
use onboard_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::services::retrieval_router::{Chunk, DocumentSearch, RetrievalError, SearchRequest};

const TITLE_EXACT_SIMILARITY: f64 = 0.95;
const TITLE_KEYWORD_SIMILARITY: f64 = 0.8;
const CONTENT_SIMILARITY: f64 = 0.6;

const SELECT_CHUNKS: &str = "SELECT document_id, chunk_index, title, category, content FROM document_chunks";

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

/// Escape LIKE wildcards and wrap in `%…%`
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn admits(request: &SearchRequest, title: &str, category: &str) -> bool {
    (request.titles.is_empty() || request.titles.iter().any(|t| t == title))
        && (request.categories.is_empty() || request.categories.iter().any(|c| c == category))
}

/// Keywords worth a LIKE scan; single characters only when nothing longer exists
fn search_keywords(request: &SearchRequest) -> Vec<&str> {
    let long: Vec<&str> = request
        .keywords
        .iter()
        .map(String::as_str)
        .filter(|k| k.chars().count() >= 2)
        .collect();
    if long.is_empty() {
        request.keywords.iter().map(String::as_str).collect()
    } else {
        long
    }
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace one chunk
    pub async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_chunks (document_id, chunk_index, title, category, content)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                content = excluded.content
            "#,
        )
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.title)
        .bind(&chunk.category)
        .bind(&chunk.content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run one stage query and append admitted, unseen chunks
    async fn collect_stage(
        &self,
        sql: &str,
        param: &str,
        similarity: f64,
        request: &SearchRequest,
        seen: &mut HashSet<(String, i64)>,
        out: &mut Vec<Chunk>,
    ) -> std::result::Result<(), sqlx::Error> {
        let rows = sqlx::query(sql).bind(param).fetch_all(&self.pool).await?;

        for row in rows {
            if out.len() >= request.limit {
                break;
            }
            let document_id: String = row.get("document_id");
            let chunk_index: i64 = row.get("chunk_index");
            let title: String = row.get("title");
            let category: String = row.get("category");

            if !admits(request, &title, &category) || !seen.insert((document_id.clone(), chunk_index)) {
                continue;
            }

            out.push(Chunk {
                document_id,
                title,
                category,
                content: row.get("content"),
                chunk_index,
                similarity,
            });
        }
        Ok(())
    }

    async fn run_search(&self, request: &SearchRequest) -> std::result::Result<Vec<Chunk>, sqlx::Error> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if request.limit == 0 {
            return Ok(out);
        }

        let by_title = format!("{} WHERE title = ? ORDER BY document_id, chunk_index", SELECT_CHUNKS);
        let by_title_keyword = format!("{} WHERE title LIKE ? ESCAPE '\\' ORDER BY document_id, chunk_index", SELECT_CHUNKS);
        let by_content_keyword = format!("{} WHERE content LIKE ? ESCAPE '\\' ORDER BY document_id, chunk_index", SELECT_CHUNKS);

        let mut exact_titles: Vec<&str> = request.titles.iter().map(String::as_str).collect();
        let query = request.query.trim();
        if !query.is_empty() && !exact_titles.contains(&query) {
            exact_titles.push(query);
        }
        for title in exact_titles {
            self.collect_stage(&by_title, title, TITLE_EXACT_SIMILARITY, request, &mut seen, &mut out)
                .await?;
        }

        let keywords = search_keywords(request);
        for keyword in &keywords {
            if out.len() >= request.limit {
                return Ok(out);
            }
            self.collect_stage(
                &by_title_keyword,
                &like_pattern(keyword),
                TITLE_KEYWORD_SIMILARITY,
                request,
                &mut seen,
                &mut out,
            )
            .await?;
        }

        for keyword in &keywords {
            if out.len() >= request.limit {
                return Ok(out);
            }
            self.collect_stage(
                &by_content_keyword,
                &like_pattern(keyword),
                CONTENT_SIMILARITY,
                request,
                &mut seen,
                &mut out,
            )
            .await?;
        }

        Ok(out)
    }
}

#[async_trait]
impl DocumentSearch for SqliteDocumentStore {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<Vec<Chunk>, RetrievalError> {
        self.run_search(request)
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))
    }

    async fn list_titles(&self) -> std::result::Result<Vec<String>, RetrievalError> {
        sqlx::query_scalar("SELECT DISTINCT title FROM document_chunks ORDER BY title")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))
    }
}
