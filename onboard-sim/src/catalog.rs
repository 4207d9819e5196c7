//! Read-only training content
//!
//! Loaded once at startup from a content directory:
//! - `personas.toml`   (`[[personas]]` tables)
//! - `situations.toml` (`[[situations]]` tables)
//! - `lexicon.toml`    (domain lexicon)

use onboard_common::config::load_toml_file;
use onboard_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::models::{Persona, Situation};
use crate::services::lexicon::{DomainLexicon, LexiconSource};

#[derive(Debug, Deserialize)]
struct PersonaFile {
    #[serde(default)]
    personas: Vec<Persona>,
}

#[derive(Debug, Deserialize)]
struct SituationFile {
    #[serde(default)]
    situations: Vec<Situation>,
}

/// Personas, situations and lexicon shared by every session
#[derive(Debug, Clone)]
pub struct ContentCatalog {
    personas: HashMap<String, Persona>,
    situations: HashMap<String, Situation>,
    lexicon: Arc<DomainLexicon>,
}

impl ContentCatalog {
    /// Build from already-parsed parts; duplicate ids are rejected
    pub fn from_parts(personas: Vec<Persona>, situations: Vec<Situation>, lexicon: DomainLexicon) -> Result<Self> {
        let mut persona_map = HashMap::new();
        for persona in personas {
            let id = persona.id.clone();
            if persona_map.insert(id.clone(), persona).is_some() {
                return Err(Error::Config(format!("Duplicate persona id: {}", id)));
            }
        }

        let mut situation_map = HashMap::new();
        for situation in situations {
            let id = situation.id.clone();
            if situation_map.insert(id.clone(), situation).is_some() {
                return Err(Error::Config(format!("Duplicate situation id: {}", id)));
            }
        }

        Ok(Self {
            personas: persona_map,
            situations: situation_map,
            lexicon: Arc::new(lexicon),
        })
    }

    /// Load all three content files from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let personas: PersonaFile = load_toml_file(&dir.join("personas.toml"))?;
        let situations: SituationFile = load_toml_file(&dir.join("situations.toml"))?;
        let lexicon: LexiconSource = load_toml_file(&dir.join("lexicon.toml"))?;

        let catalog = Self::from_parts(
            personas.personas,
            situations.situations,
            DomainLexicon::from_source(lexicon),
        )?;

        tracing::info!(
            dir = %dir.display(),
            personas = catalog.personas.len(),
            situations = catalog.situations.len(),
            "Content catalog loaded"
        );
        Ok(catalog)
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.get(id)
    }

    pub fn situation(&self, id: &str) -> Option<&Situation> {
        self.situations.get(id)
    }

    pub fn lexicon(&self) -> &Arc<DomainLexicon> {
        &self.lexicon
    }

    pub fn persona_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn situation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.situations.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
