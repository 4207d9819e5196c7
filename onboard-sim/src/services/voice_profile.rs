//! Persona → synthesis voice parameters

use serde::{Deserialize, Serialize};

use crate::models::{Gender, Persona};

/// Voice rendering parameters for a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_id: String,
    /// Speaking rate multiplier, 1.0 = normal
    pub rate: f32,
    /// Pitch offset in semitones; applied only by engines that support it
    pub pitch: f32,
}

const MIN_RATE: f32 = 0.7;
const MAX_RATE: f32 = 1.3;

/// Derive voice parameters from persona demographics and customer type
pub fn voice_profile(persona: &Persona) -> VoiceProfile {
    let voice_id = match persona.demographics.gender {
        Gender::Female => "nova",
        Gender::Male => "onyx",
        Gender::Unspecified => "alloy",
    };

    let mut rate: f32 = match persona.demographics.age {
        0..=29 => 1.1,
        30..=59 => 1.0,
        _ => 0.9,
    };
    let mut pitch: f32 = 0.0;

    match persona.customer_type.to_lowercase().as_str() {
        "impatient" | "busy" | "angry" => {
            rate += 0.1;
            pitch += 1.0;
        }
        "elderly" | "confused" => {
            rate -= 0.05;
            pitch -= 1.0;
        }
        "anxious" => {
            rate += 0.05;
            pitch += 0.5;
        }
        "vip" | "calm" => {
            rate -= 0.05;
        }
        _ => {}
    }

    VoiceProfile {
        voice_id: voice_id.to_string(),
        rate: rate.clamp(MIN_RATE, MAX_RATE),
        pitch,
    }
}
