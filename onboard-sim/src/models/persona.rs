//! Synthetic customer persona
//!
//! Personas are loaded once from content files and never mutated. They drive
//! both the generation constraints and the voice rendering parameters.

use serde::{Deserialize, Serialize};

/// Customer gender as used for voice selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Unspecified => "unspecified",
        }
    }
}

/// Demographic attributes of a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Age in years
    pub age: u8,
    #[serde(default)]
    pub gender: Gender,
    /// Occupation label (e.g. "office worker", "retiree")
    #[serde(default)]
    pub occupation: String,
}

/// Speaking-style parameters of a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaStyle {
    /// Free-text speaking style ("short and blunt", "polite, hesitant")
    #[serde(default)]
    pub speaking_style: String,
    /// Patience level 1 (impatient) - 5 (very patient)
    #[serde(default = "default_patience")]
    pub patience: u8,
    /// Register to use ("formal", "casual")
    #[serde(default)]
    pub formality: String,
    /// Personality traits
    #[serde(default)]
    pub traits: Vec<String>,
}

fn default_patience() -> u8 {
    3
}

impl Default for PersonaStyle {
    fn default() -> Self {
        Self {
            speaking_style: String::new(),
            patience: default_patience(),
            formality: String::new(),
            traits: Vec::new(),
        }
    }
}

/// Fixed synthetic-customer profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub demographics: Demographics,
    /// Customer type tag ("elderly", "impatient", "vip", "first_time", ...)
    pub customer_type: String,
    /// Tone tag ("anxious", "friendly", "skeptical", ...)
    pub tone: String,
    #[serde(default)]
    pub style: PersonaStyle,
    #[serde(default)]
    pub sample_utterances: Vec<String>,
}
