//! Live session registry
//!
//! Each session sits behind its own async mutex. A turn holds the mutex for
//! its whole pipeline; a second request for the same session fails fast with
//! `SessionBusy` instead of queueing behind it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{SessionError, SimulationSession};

/// Shared handle to one live session
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<SimulationSession>>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Exclusive access, or `SessionBusy` if another request holds it
    pub fn try_acquire(&self, session_id: Uuid) -> Result<OwnedMutexGuard<SimulationSession>, SessionError> {
        self.session
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::SessionBusy(session_id))
    }

    /// Exclusive access, waiting for the current holder
    pub async fn acquire(&self) -> OwnedMutexGuard<SimulationSession> {
        self.session.clone().lock_owned().await
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    /// Parent of every session token; cancelled on shutdown
    root: CancellationToken,
}

impl SessionRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            root,
        }
    }

    /// Register a session under a fresh child cancellation token
    pub async fn insert(&self, session: SimulationSession) -> SessionHandle {
        let session_id = session.session_id;
        let handle = SessionHandle {
            session: Arc::new(Mutex::new(session)),
            cancel: self.root.child_token(),
        };
        self.sessions.write().await.insert(session_id, handle.clone());
        handle
    }

    pub async fn get(&self, session_id: Uuid) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Abort in-flight calls of every session
    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demographics, Gender, Persona, PersonaStyle, Situation};

    fn session() -> SimulationSession {
        SimulationSession::new(
            "u1",
            Persona {
                id: "p".to_string(),
                name: "n".to_string(),
                demographics: Demographics {
                    age: 30,
                    gender: Gender::Male,
                    occupation: String::new(),
                },
                customer_type: "friendly".to_string(),
                tone: "calm".to_string(),
                style: PersonaStyle::default(),
                sample_utterances: vec![],
            },
            Situation {
                id: "s".to_string(),
                title: "t".to_string(),
                category: "deposit".to_string(),
                goals: vec![],
                required_slots: vec![],
                forbidden_claims: vec![],
                style_rules: vec![],
                disclaimer: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn second_holder_is_rejected_as_busy() {
        let registry = SessionRegistry::new(CancellationToken::new());
        let s = session();
        let id = s.session_id;
        let handle = registry.insert(s).await;

        let guard = handle.try_acquire(id).unwrap();
        let again = registry.get(id).await.unwrap();
        assert!(matches!(again.try_acquire(id), Err(SessionError::SessionBusy(busy)) if busy == id));

        drop(guard);
        assert!(again.try_acquire(id).is_ok());
    }

    #[tokio::test]
    async fn unknown_session_not_found() {
        let registry = SessionRegistry::new(CancellationToken::new());
        let id = Uuid::new_v4();
        assert!(matches!(registry.get(id).await, Err(SessionError::SessionNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn cancel_all_reaches_session_tokens() {
        let registry = SessionRegistry::new(CancellationToken::new());
        let handle = registry.insert(session()).await;
        assert!(!handle.cancel_token().is_cancelled());

        registry.cancel_all();
        assert!(handle.cancel_token().is_cancelled());
    }
}
