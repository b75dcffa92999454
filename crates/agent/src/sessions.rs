use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use concierge_core::domain::session::{Session, SessionId};

/// In-process session registry. Turns for one session are serialized by
/// the per-session mutex; different sessions run independently.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub async fn get_or_create(&self, id: &SessionId) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }
        self.sessions
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone()))))
            .clone()
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Copy of the session as it is between turns.
    pub async fn snapshot(&self, id: &SessionId) -> Option<Session> {
        let session = self.get(id).await?;
        let guard = session.lock().await;
        Some(guard.clone())
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
