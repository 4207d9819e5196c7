//! Competency Scorer
//!
//! Reduces a completed transcript to six rubric scores, an overall mean and a
//! letter grade. Employee turns are graded; customer turns are context.
//! Any failure (timeout, transport, unparsable or incomplete reply) yields
//! [`CompetencyEvaluation::neutral_default`].

use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::generation_client::{GenerationClient, GenerationRequest};
use crate::models::{Competency, CompetencyEvaluation, CompetencyScore, Persona, Situation, Speaker, Turn};
use crate::utils::{extract_json_object, with_deadline};

pub struct CompetencyScorer {
    client: Arc<dyn GenerationClient>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl CompetencyScorer {
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32, timeout: Duration) -> Self {
        Self {
            client,
            temperature,
            max_tokens: 900,
            timeout,
        }
    }

    fn request(&self, turns: &[Turn], persona: &Persona, situation: &Situation) -> GenerationRequest {
        let mut system = String::from(
            "You are a senior bank trainer grading a new employee's customer conversation. \
             Grade only the EMPLOYEE turns; customer turns are context. Score each axis 0-100 \
             with one or two sentences of specific feedback.\n\n## Axes\n",
        );
        for competency in Competency::ALL {
            let _ = writeln!(system, "- {}: {}", competency.as_str(), competency.rubric());
        }
        system.push_str("\nReturn ONLY one JSON object with shape:\n");
        system.push_str(
            r#"{"knowledge":{"score":0,"feedback":"..."},"skill":{"score":0,"feedback":"..."},"empathy":{"score":0,"feedback":"..."},"clarity":{"score":0,"feedback":"..."},"kindness":{"score":0,"feedback":"..."},"confidence":{"score":0,"feedback":"..."},"summary":"...","improvements":["..."]}"#,
        );
        system.push('\n');

        let mut user = String::new();
        let _ = writeln!(
            user,
            "## Customer\n{} ({} years, {}), type: {}, tone: {}",
            persona.name,
            persona.demographics.age,
            persona.demographics.occupation,
            persona.customer_type,
            persona.tone
        );
        let _ = writeln!(user, "\n## Situation\n{} ({})", situation.title, situation.category);
        for goal in &situation.goals {
            let _ = writeln!(user, "- goal: {}", goal);
        }
        for claim in &situation.forbidden_claims {
            let _ = writeln!(user, "- forbidden claim: {}", claim);
        }

        user.push_str("\n## Transcript\n");
        for turn in turns {
            let marker = match turn.role {
                Speaker::Employee => "EMPLOYEE",
                Speaker::Customer => "customer",
            };
            let _ = writeln!(user, "{}: {}", marker, turn.text);
        }

        GenerationRequest {
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Score a transcript; never fails
    pub async fn evaluate(
        &self,
        turns: &[Turn],
        persona: &Persona,
        situation: &Situation,
        cancel: &CancellationToken,
    ) -> CompetencyEvaluation {
        let request = self.request(turns, persona, situation);
        let raw = match with_deadline(self.timeout, cancel, self.client.complete(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Scoring generation failed, using neutral evaluation");
                return CompetencyEvaluation::neutral_default();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Scoring did not complete, using neutral evaluation");
                return CompetencyEvaluation::neutral_default();
            }
        };

        match parse_evaluation(&raw) {
            Some(evaluation) => {
                tracing::info!(
                    overall = evaluation.overall_score,
                    grade = evaluation.grade.as_str(),
                    "Session evaluated"
                );
                evaluation
            }
            None => {
                tracing::warn!("Scoring reply unparsable or incomplete, using neutral evaluation");
                CompetencyEvaluation::neutral_default()
            }
        }
    }
}

fn parse_axis(value: &Value, competency: Competency) -> Option<CompetencyScore> {
    let axis = value.get(competency.as_str())?;
    let score = match axis.get("score") {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let feedback = axis.get("feedback").and_then(Value::as_str).unwrap_or_default();
    Some(CompetencyScore::new(score, feedback))
}

/// All six axes or nothing
fn parse_evaluation(raw: &str) -> Option<CompetencyEvaluation> {
    let value: Value = serde_json::from_str(extract_json_object(raw)?).ok()?;

    let mut axes = Vec::with_capacity(Competency::ALL.len());
    for competency in Competency::ALL {
        axes.push(parse_axis(&value, competency)?);
    }
    let axes: [CompetencyScore; 6] = axes.try_into().ok()?;

    let summary = value.get("summary").and_then(Value::as_str).unwrap_or_default();
    let improvements = value
        .get("improvements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(CompetencyEvaluation::from_axes(axes, summary, improvements))
}
