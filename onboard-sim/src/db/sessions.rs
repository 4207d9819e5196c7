//! Completed session archive
//!
//! Transcripts, goal sets and per-competency scores are stored as JSON
//! columns; everything above this module works with typed structs.

use async_trait::async_trait;
use chrono::Utc;
use onboard_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{CompetencyEvaluation, SimulationSession, Turn};
use crate::utils::retry_on_lock;

/// Session persistence collaborator
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a completed session together with its evaluation
    async fn save_completed(&self, session: &SimulationSession, evaluation: &CompetencyEvaluation) -> Result<()>;
}

/// Archived session row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub persona_id: String,
    pub situation_id: String,
    pub state: String,
    pub turns: Vec<Turn>,
    pub achieved_goals: Vec<usize>,
    pub goal_score: f64,
    pub duration_seconds: i64,
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str, what: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", what, e)))
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self { pool, max_lock_wait_ms }
    }

    pub async fn load_session(&self, session_id: Uuid) -> Result<Option<StoredSession>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, user_id, persona_id, situation_id, state, transcript,
                   achieved_goals, goal_score, duration_seconds
            FROM simulation_sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let transcript: String = row.get("transcript");
        let achieved_goals: String = row.get("achieved_goals");

        Ok(Some(StoredSession {
            session_id,
            user_id: row.get("user_id"),
            persona_id: row.get("persona_id"),
            situation_id: row.get("situation_id"),
            state: row.get("state"),
            turns: from_json(&transcript, "transcript")?,
            achieved_goals: from_json(&achieved_goals, "achieved goals")?,
            goal_score: row.get("goal_score"),
            duration_seconds: row.get("duration_seconds"),
        }))
    }

    pub async fn load_evaluation(&self, session_id: Uuid) -> Result<Option<CompetencyEvaluation>> {
        let row = sqlx::query(
            r#"
            SELECT overall_score, grade, performance_level, per_competency, summary, improvements
            FROM competency_evaluations
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let grade: String = row.get("grade");
        let per_competency: String = row.get("per_competency");
        let improvements: String = row.get("improvements");

        Ok(Some(CompetencyEvaluation {
            per_competency: from_json(&per_competency, "per-competency scores")?,
            overall_score: row.get("overall_score"),
            grade: from_json(&format!("\"{}\"", grade), "grade")?,
            performance_level: row.get("performance_level"),
            summary: row.get("summary"),
            improvements: from_json(&improvements, "improvements")?,
        }))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save_completed(&self, session: &SimulationSession, evaluation: &CompetencyEvaluation) -> Result<()> {
        // Prepare all data before touching the database
        let session_id = session.session_id.to_string();
        let state = session.state().as_str();
        let transcript = to_json(session.turns(), "transcript")?;
        let achieved: Vec<usize> = session.achieved_goals().iter().copied().collect();
        let achieved_goals = to_json(&achieved, "achieved goals")?;
        let stuck_counter = i64::from(session.stuck_counter());
        let goal_score = session.goal_score();
        let started_at = session.started_at.to_rfc3339();
        let ended_at = session.ended_at().map(|dt| dt.to_rfc3339());
        let duration_seconds = session.duration_seconds();

        let per_competency = to_json(&evaluation.per_competency, "per-competency scores")?;
        let improvements = to_json(&evaluation.improvements, "improvements")?;
        let grade = evaluation.grade.as_str();
        let evaluated_at = Utc::now().to_rfc3339();

        retry_on_lock("save_completed_session", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO simulation_sessions (
                    session_id, user_id, persona_id, situation_id, state, transcript,
                    achieved_goals, stuck_counter, goal_score, started_at, ended_at, duration_seconds
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                    state = excluded.state,
                    transcript = excluded.transcript,
                    achieved_goals = excluded.achieved_goals,
                    stuck_counter = excluded.stuck_counter,
                    goal_score = excluded.goal_score,
                    ended_at = excluded.ended_at,
                    duration_seconds = excluded.duration_seconds
                "#,
            )
            .bind(&session_id)
            .bind(&session.user_id)
            .bind(&session.persona.id)
            .bind(&session.situation.id)
            .bind(state)
            .bind(&transcript)
            .bind(&achieved_goals)
            .bind(stuck_counter)
            .bind(goal_score)
            .bind(&started_at)
            .bind(&ended_at)
            .bind(duration_seconds)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO competency_evaluations (
                    session_id, overall_score, grade, performance_level,
                    per_competency, summary, improvements, evaluated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                    overall_score = excluded.overall_score,
                    grade = excluded.grade,
                    performance_level = excluded.performance_level,
                    per_competency = excluded.per_competency,
                    summary = excluded.summary,
                    improvements = excluded.improvements,
                    evaluated_at = excluded.evaluated_at
                "#,
            )
            .bind(&session_id)
            .bind(evaluation.overall_score)
            .bind(grade)
            .bind(&evaluation.performance_level)
            .bind(&per_competency)
            .bind(&evaluation.summary)
            .bind(&improvements)
            .bind(&evaluated_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await?;

        tracing::info!(session_id = %session.session_id, grade, "Completed session archived");
        Ok(())
    }
}
