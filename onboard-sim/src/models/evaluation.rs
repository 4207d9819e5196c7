//! End-of-session competency evaluation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One of the six fixed rubric axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Competency {
    Knowledge,
    Skill,
    Empathy,
    Clarity,
    Kindness,
    Confidence,
}

impl Competency {
    pub const ALL: [Competency; 6] = [
        Competency::Knowledge,
        Competency::Skill,
        Competency::Empathy,
        Competency::Clarity,
        Competency::Kindness,
        Competency::Confidence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Competency::Knowledge => "knowledge",
            Competency::Skill => "skill",
            Competency::Empathy => "empathy",
            Competency::Clarity => "clarity",
            Competency::Kindness => "kindness",
            Competency::Confidence => "confidence",
        }
    }

    /// Rubric description given to the scoring model
    pub fn rubric(&self) -> &'static str {
        match self {
            Competency::Knowledge => "accuracy of product, rate, fee and regulation information",
            Competency::Skill => "needs discovery, required-information collection and procedure handling",
            Competency::Empathy => "recognition of the customer's feelings and situation",
            Competency::Clarity => "plain, structured explanations the customer can follow",
            Competency::Kindness => "courtesy, honorifics and a welcoming attitude",
            Competency::Confidence => "assured delivery without hedging or contradictions",
        }
    }
}

/// Letter grade banding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// ≥90 A, ≥80 B, ≥70 C, ≥60 D, else F
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    /// Fixed performance-level label for the band
    pub fn performance_level(&self) -> &'static str {
        match self {
            Grade::A => "Excellent",
            Grade::B => "Good",
            Grade::C => "Satisfactory",
            Grade::D => "Needs Improvement",
            Grade::F => "Unsatisfactory",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Score and justification for one axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyScore {
    /// 0-100
    pub score: f64,
    pub feedback: String,
}

impl CompetencyScore {
    /// Create score clamped to 0-100; NaN collapses to 0
    pub fn new(score: f64, feedback: impl Into<String>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) };
        Self {
            score,
            feedback: feedback.into(),
        }
    }
}

/// Multi-axis evaluation of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyEvaluation {
    pub per_competency: BTreeMap<Competency, CompetencyScore>,
    pub overall_score: f64,
    pub grade: Grade,
    pub performance_level: String,
    pub summary: String,
    pub improvements: Vec<String>,
}

impl CompetencyEvaluation {
    /// Build an evaluation from exactly six axis scores in `Competency::ALL` order
    pub fn from_axes(
        axes: [CompetencyScore; 6],
        summary: impl Into<String>,
        improvements: Vec<String>,
    ) -> Self {
        let per_competency: BTreeMap<_, _> = Competency::ALL.into_iter().zip(axes).collect();
        let overall_score =
            per_competency.values().map(|c| c.score).sum::<f64>() / Competency::ALL.len() as f64;
        let grade = Grade::from_score(overall_score);

        Self {
            per_competency,
            overall_score,
            grade,
            performance_level: grade.performance_level().to_string(),
            summary: summary.into(),
            improvements,
        }
    }

    /// Fixed neutral evaluation used when scoring fails
    pub fn neutral_default() -> Self {
        let axes = Competency::ALL.map(|c| {
            CompetencyScore::new(
                70.0,
                format!("Automatic evaluation of {} was unavailable; a neutral score was assigned.", c.as_str()),
            )
        });
        Self::from_axes(
            axes,
            "The session was completed. A detailed evaluation could not be produced.",
            vec!["Review the transcript with a trainer for detailed feedback.".to_string()],
        )
    }

    pub fn score(&self, competency: Competency) -> Option<f64> {
        self.per_competency.get(&competency).map(|c| c.score)
    }
}
