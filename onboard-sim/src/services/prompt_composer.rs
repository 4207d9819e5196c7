//! Prompt Composer
//!
//! Builds the constrained generation request for the simulated customer and
//! parses the structured reply. Parsing never fails: malformed output
//! degrades to the first usable line of the raw text.
//!
//! **Reply schema:**
//! ```json
//! {"script": "...", "followups": ["..."], "safety_notes": ["..."],
//!  "grounding": ["doc-id"], "end_conversation": false}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;

use super::generation_client::GenerationRequest;
use super::normalizer::NormalizationResult;
use super::retrieval_router::Chunk;
use crate::models::{Persona, Situation, Turn};
use crate::utils::extract_json_object;

/// History turns carried into each request
pub const HISTORY_WINDOW: usize = 4;

pub const MAX_FOLLOWUPS: usize = 2;

pub const MAX_SCRIPT_SENTENCES: usize = 3;

/// Evidence excerpt length cap, in chars
const MAX_EVIDENCE_CHARS: usize = 600;

/// In-character line used when generation times out or fails
pub const FALLBACK_SCRIPT: &str = "죄송해요, 제가 잠깐 다른 생각을 했네요. 방금 하신 말씀 다시 한 번 설명해 주시겠어요?";

/// Raw reply substituted for a failed generation; parsed like any other reply
pub const FALLBACK_REPLY: &str = r#"{"script": "죄송해요, 제가 잠깐 다른 생각을 했네요. 방금 하신 말씀 다시 한 번 설명해 주시겠어요?", "followups": [], "safety_notes": [], "grounding": [], "end_conversation": false}"#;

const SENTENCE_TERMINATORS: [char; 6] = ['.', '?', '!', '。', '？', '！'];

/// Generation request plus what went into it
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub request: GenerationRequest,
    /// History turns included (≤ [`HISTORY_WINDOW`])
    pub history_turns: usize,
    /// Document ids offered as evidence
    pub evidence_ids: Vec<String>,
}

/// Parsed customer reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerReply {
    pub script: String,
    pub followups: Vec<String>,
    pub safety_notes: Vec<String>,
    /// Cited document ids, restricted to the supplied evidence
    pub grounding: Vec<String>,
    pub end_conversation: bool,
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    temperature: f32,
    max_tokens: u32,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(0.6, 400)
    }
}

impl PromptComposer {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Request for the customer's opening line (turn 0)
    pub fn compose_opening(&self, persona: &Persona, situation: &Situation) -> ComposedPrompt {
        let system = system_prompt(persona, situation);
        let mut user = String::new();
        user.push_str("## Task\n");
        user.push_str(
            "Open the conversation. You have just walked up to the counter: greet the employee once \
             and state why you came today, in character. Do not reveal every goal at once.\n\n",
        );
        user.push_str("## Reference material\nNone.\n");

        ComposedPrompt {
            request: self.request(system, user),
            history_turns: 0,
            evidence_ids: Vec::new(),
        }
    }

    /// Request for the customer's reply to an employee utterance
    pub fn compose(
        &self,
        persona: &Persona,
        situation: &Situation,
        utterance: &str,
        hits: &[Chunk],
        history: &[Turn],
        normalization: &NormalizationResult,
    ) -> ComposedPrompt {
        let system = system_prompt(persona, situation);
        let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

        let mut user = String::new();
        user.push_str("## Conversation so far (most recent last)\n");
        if window.is_empty() {
            user.push_str("(none)\n");
        }
        for turn in window {
            let _ = writeln!(user, "{}: {}", turn.role.as_str(), turn.text);
        }

        let _ = write!(user, "\n## The employee just said\n{}\n", utterance);

        let hints = transcription_hints(normalization);
        if !hints.is_empty() {
            user.push_str("\n## Transcription hints\n");
            for hint in hints {
                let _ = writeln!(user, "- {}", hint);
            }
        }

        let mut evidence_ids: Vec<String> = Vec::new();
        user.push_str("\n## Reference material\n");
        if hits.is_empty() {
            user.push_str(
                "None. Do not quote specific rates, fees or conditions you were not given.\n",
            );
        }
        for chunk in hits {
            if !evidence_ids.contains(&chunk.document_id) {
                evidence_ids.push(chunk.document_id.clone());
            }
            let excerpt: String = chunk.content.chars().take(MAX_EVIDENCE_CHARS).collect();
            let _ = writeln!(user, "[{}] {}: {}", chunk.document_id, chunk.title, excerpt);
        }

        ComposedPrompt {
            request: self.request(system, user),
            history_turns: window.len(),
            evidence_ids,
        }
    }

    fn request(&self, system: String, user: String) -> GenerationRequest {
        GenerationRequest {
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Parse a raw reply; grounding is restricted to `evidence_ids`
    pub fn parse_reply(&self, raw: &str, evidence_ids: &[String]) -> CustomerReply {
        let mut reply = extract_json_object(raw)
            .and_then(|json| serde_json::from_str::<Value>(json).ok())
            .and_then(|value| reply_from_value(&value))
            .unwrap_or_else(|| {
                tracing::debug!("Reply was not structured, using first line as script");
                CustomerReply {
                    script: loose_script_field(raw)
                        .or_else(|| first_content_line(raw))
                        .unwrap_or(FALLBACK_SCRIPT)
                        .to_string(),
                    ..CustomerReply::default()
                }
            });

        reply.script = cap_sentences(&reply.script, MAX_SCRIPT_SENTENCES);
        reply.followups.truncate(MAX_FOLLOWUPS);
        reply.grounding.retain(|id| evidence_ids.contains(id));
        reply
    }

    /// Add a clarifying question when the input was ambiguous and none was asked
    pub fn ensure_clarification(&self, reply: &mut CustomerReply, normalization: &NormalizationResult) {
        if !normalization.needs_clarification || !reply.followups.is_empty() {
            return;
        }
        let question = match normalization.corrections.first() {
            Some(correction) => format!("혹시 '{}' 말씀하신 게 맞나요?", correction.corrected),
            None => "죄송한데 잘 못 들었어요. 다시 한 번 말씀해 주시겠어요?".to_string(),
        };
        reply.followups.push(question);
    }
}

fn system_prompt(persona: &Persona, situation: &Situation) -> String {
    let mut s = String::new();
    s.push_str(
        "You are role-playing a bank customer in a training simulation for new bank employees. \
         Stay in character as the customer described below for the whole conversation. \
         Speak Korean, in the first person, as the customer. Never act as the employee.\n",
    );

    let demographics = &persona.demographics;
    let style = &persona.style;
    s.push_str("\n## Persona\n");
    let _ = writeln!(s, "- name: {}", persona.name);
    let _ = writeln!(
        s,
        "- age: {}, gender: {}, occupation: {}",
        demographics.age,
        demographics.gender.as_str(),
        demographics.occupation
    );
    let _ = writeln!(s, "- customer type: {}", persona.customer_type);
    let _ = writeln!(s, "- tone: {}", persona.tone);
    let _ = writeln!(s, "- speaking style: {}", style.speaking_style);
    let _ = writeln!(s, "- patience: {}/5", style.patience);
    let _ = writeln!(s, "- formality: {}", style.formality);
    if !style.traits.is_empty() {
        let _ = writeln!(s, "- traits: {}", style.traits.join(", "));
    }
    for sample in &persona.sample_utterances {
        let _ = writeln!(s, "- sample line: \"{}\"", sample);
    }

    s.push_str("\n## Situation\n");
    let _ = writeln!(s, "- title: {}", situation.title);
    let _ = writeln!(s, "- category: {}", situation.category);
    s.push_str("- what you want from this visit:\n");
    for (i, goal) in situation.goals.iter().enumerate() {
        let _ = writeln!(s, "  {}. {}", i, goal);
    }
    push_list(&mut s, "- information the employee should ask for or give", &situation.required_slots);
    push_list(&mut s, "- claims the employee must never make", &situation.forbidden_claims);
    push_list(&mut s, "- style rules", &situation.style_rules);
    if !situation.disclaimer.is_empty() {
        let _ = writeln!(s, "- disclaimer: {}", situation.disclaimer);
    }

    s.push_str("\n## Rules\n");
    s.push_str("1) Never repeat a greeting, or a goal you already stated, that appears in the conversation so far.\n");
    s.push_str("2) `script` is what you say next: 1 to 3 short sentences.\n");
    s.push_str("3) `followups` holds at most 2 questions you still want to ask.\n");
    s.push_str("4) If the employee makes a forbidden claim or misstates a fact, react as a real customer would and note it in `safety_notes`.\n");
    s.push_str("5) `grounding` lists only ids from the reference material you relied on.\n");
    s.push_str("6) Set `end_conversation` to true only when your needs are met and the conversation has naturally ended.\n");
    s.push_str("7) Return ONLY one JSON object with shape:\n");
    s.push_str(
        r#"{"script":"...","followups":["..."],"safety_notes":["..."],"grounding":["doc-id"],"end_conversation":false}"#,
    );
    s.push('\n');
    s
}

fn push_list(buf: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(buf, "{}:", label);
    for item in items {
        let _ = writeln!(buf, "  - {}", item);
    }
}

fn transcription_hints(normalization: &NormalizationResult) -> Vec<String> {
    let mut hints = Vec::new();
    for correction in &normalization.corrections {
        hints.push(format!(
            "\"{}\" was heard and corrected to \"{}\"",
            correction.token, correction.corrected
        ));
    }
    let entities = &normalization.entities;
    if !entities.products.is_empty() {
        hints.push(format!("products mentioned: {}", entities.products.join(", ")));
    }
    if !entities.amounts.is_empty() {
        hints.push(format!("amounts mentioned: {}", entities.amounts.join(", ")));
    }
    if !entities.periods.is_empty() {
        hints.push(format!("periods mentioned: {}", entities.periods.join(", ")));
    }
    if normalization.needs_clarification {
        hints.push("the transcription may be unreliable; ask the employee to confirm what you did not follow".to_string());
    }
    hints
}

/// String, or list of strings; numbers are stringified
fn string_list(value: Option<&Value>) -> Vec<String> {
    let item = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(item)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(v) => item(v).filter(|s| !s.is_empty()).into_iter().collect(),
        None => Vec::new(),
    }
}

fn reply_from_value(value: &Value) -> Option<CustomerReply> {
    let script = value.get("script")?.as_str()?.trim();
    if script.is_empty() {
        return None;
    }
    Some(CustomerReply {
        script: script.to_string(),
        followups: string_list(value.get("followups")),
        safety_notes: string_list(value.get("safety_notes")),
        grounding: string_list(value.get("grounding")),
        end_conversation: value
            .get("end_conversation")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Value of a `"script": "..."` line in a truncated or malformed object
fn loose_script_field(raw: &str) -> Option<&str> {
    raw.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("\"script\"")?.trim_start().strip_prefix(':')?;
        let value = rest.trim().trim_end_matches(',').trim().trim_matches('"').trim();
        (!value.is_empty()).then_some(value)
    })
}

/// First line carrying words: code fences and bare JSON punctuation are skipped
fn first_content_line(raw: &str) -> Option<&str> {
    raw.lines().map(str::trim).find(|line| {
        !line.starts_with("```")
            && line
                .chars()
                .any(|c| !c.is_whitespace() && !matches!(c, '{' | '}' | '[' | ']' | '"' | ',' | ':'))
    })
}

/// Keep at most `max` sentences
fn cap_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }
        match chars.peek() {
            // "?!" and "..." end one sentence
            Some((_, next)) if SENTENCE_TERMINATORS.contains(next) => continue,
            Some((_, next)) if !next.is_whitespace() => continue,
            _ => {}
        }
        count += 1;
        if count == max {
            return text[..i + c.len_utf8()].to_string();
        }
    }
    text.to_string()
}
