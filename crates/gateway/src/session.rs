use {chrono::Utc, dashmap::DashMap, fittrack_oauth::Session, tracing::debug};

/// Sessions established through the callback, keyed by cookie value.
///
/// A session whose access token has expired is treated as absent and dropped
/// on the next lookup or insert.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

fn is_expired(session: &Session, now: i64) -> bool {
    session
        .expires_at
        .is_some_and(|at| i64::try_from(at).unwrap_or(i64::MAX) <= now)
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` and return its opaque id.
    pub fn insert(&self, session: Session) -> String {
        self.purge_expired();
        let id = uuid::Uuid::new_v4().to_string();
        debug!(user_id = ?session.user_id, "session established");
        self.sessions.insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now().timestamp();
        if self
            .sessions
            .remove_if(id, |_, s| is_expired(s, now))
            .is_some()
        {
            debug!("session expired");
            return None;
        }
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !is_expired(s, now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
