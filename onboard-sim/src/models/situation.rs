//! Training scenario bound to a session

use serde::{Deserialize, Serialize};

/// Fixed training scenario
///
/// Goal indices (position in `goals`) are the identifiers used by
/// goal-achievement tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub id: String,
    pub title: String,
    /// Document category the scenario belongs to ("deposit", "loan", ...)
    pub category: String,
    pub goals: Vec<String>,
    /// Information the employee must collect or provide
    #[serde(default)]
    pub required_slots: Vec<String>,
    /// Claims the employee must never make
    #[serde(default)]
    pub forbidden_claims: Vec<String>,
    #[serde(default)]
    pub style_rules: Vec<String>,
    #[serde(default)]
    pub disclaimer: String,
}
