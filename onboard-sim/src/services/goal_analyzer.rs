//! Goal achievement analysis
//!
//! Asks the generation service which situation goals the transcript has
//! satisfied. Partial achievement is judged by the model.

use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;

use super::generation_client::{GenerationClient, GenerationError, GenerationRequest};
use crate::models::Turn;
use crate::utils::extract_json_object;

#[derive(Debug, Deserialize)]
struct GoalReply {
    #[serde(default)]
    achieved_goals: Vec<i64>,
}

pub struct GoalAnalyzer {
    client: Arc<dyn GenerationClient>,
    temperature: f32,
    max_tokens: u32,
}

impl GoalAnalyzer {
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
            max_tokens: 200,
        }
    }

    fn request(&self, goals: &[String], transcript: &[Turn]) -> GenerationRequest {
        let system = "You review bank customer-service conversations. Decide which of the customer's \
                      goals the employee has achieved so far. A goal that is substantially addressed \
                      counts as achieved even if minor details are missing. Return ONLY JSON: \
                      {\"achieved_goals\": [<goal index>, ...]}"
            .to_string();

        let mut user = String::from("## Goals\n");
        for (i, goal) in goals.iter().enumerate() {
            let _ = writeln!(user, "{}. {}", i, goal);
        }
        user.push_str("\n## Transcript\n");
        for turn in transcript {
            let _ = writeln!(user, "{}: {}", turn.role.as_str(), turn.text);
        }

        GenerationRequest {
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Indices of goals the transcript achieves
    ///
    /// Out-of-range indices are dropped. An unparsable reply is an error so the
    /// caller can treat it as "no newly achieved goals".
    pub async fn analyze(&self, goals: &[String], transcript: &[Turn]) -> Result<Vec<usize>, GenerationError> {
        if goals.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self.client.complete(self.request(goals, transcript)).await?;
        let json = extract_json_object(&raw)
            .ok_or_else(|| GenerationError::Serialization("No JSON object in goal reply".to_string()))?;
        let reply: GoalReply =
            serde_json::from_str(json).map_err(|e| GenerationError::Serialization(e.to_string()))?;

        let mut indices: Vec<usize> = reply
            .achieved_goals
            .into_iter()
            .filter_map(|i| usize::try_from(i).ok())
            .filter(|&i| i < goals.len())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl GenerationClient for Fixed {
        async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            assert!((request.temperature - 0.2).abs() < f32::EPSILON);
            Ok(self.0.to_string())
        }
    }

    fn goals() -> Vec<String> {
        vec!["금리 안내".to_string(), "만기 안내".to_string(), "서류 안내".to_string()]
    }

    #[tokio::test]
    async fn parses_indices_and_drops_out_of_range() {
        let analyzer = GoalAnalyzer::new(Arc::new(Fixed(r#"{"achieved_goals": [2, 0, 7, -1, 0]}"#)), 0.2);
        assert_eq!(analyzer.analyze(&goals(), &[]).await.unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn unparsable_reply_is_error() {
        let analyzer = GoalAnalyzer::new(Arc::new(Fixed("goal 1 looks done")), 0.2);
        assert!(analyzer.analyze(&goals(), &[]).await.is_err());
    }

    #[tokio::test]
    async fn no_goals_skips_call() {
        let analyzer = GoalAnalyzer::new(Arc::new(Fixed("not json")), 0.2);
        assert!(analyzer.analyze(&[], &[]).await.unwrap().is_empty());
    }
}
