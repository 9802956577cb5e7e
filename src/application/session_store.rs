// In-memory store of live configuration sessions and completed configurations
use crate::domain::report_config::ReportConfig;
use crate::domain::session::ConfigSession;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One session behind its own lock; requests for the same id are serialized
pub type SharedSession = Arc<Mutex<ConfigSession>>;

#[derive(Debug, Clone)]
pub struct ArchivedConfig {
    pub config: ReportConfig,
    pub archived_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: DashMap<String, SharedSession>,
    completed: DashMap<String, ArchivedConfig>,
    ttl: TimeDelta,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            completed: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Existing session for `session_id`, or a new one from `create`.
    /// The flag is true when the session was created.
    pub fn get_or_create(
        &self,
        session_id: &str,
        create: impl FnOnce() -> ConfigSession,
    ) -> (SharedSession, bool) {
        let mut created = false;
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(create()))
            })
            .value()
            .clone();
        (session, created)
    }

    pub fn remove(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    pub fn archive(&self, session_id: &str, config: ReportConfig) {
        self.completed.insert(
            session_id.to_string(),
            ArchivedConfig {
                config,
                archived_at: Utc::now(),
            },
        );
    }

    pub fn completed(&self, session_id: &str) -> Option<ReportConfig> {
        self.completed
            .get(session_id)
            .map(|entry| entry.config.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle longer than the TTL and expired archives.
    /// Sessions currently locked by a request are in use and kept.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len() + self.completed.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => now - session.updated_at < self.ttl,
            Err(_) => true,
        });
        self.completed
            .retain(|_, archived| now - archived.archived_at < self.ttl);
        before.saturating_sub(self.sessions.len() + self.completed.len())
    }
}

/// Periodically purge expired sessions until `shutdown` fires
pub fn spawn_cleanup(
    store: Arc<SessionStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let purged = store.purge_expired();
                    if purged > 0 {
                        info!("Purged {} expired sessions", purged);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report_config::Section;

    fn session(id: &str) -> ConfigSession {
        ConfigSession::new(id, Section::SteadyState, "run-1")
    }

    #[test]
    fn test_get_or_create_resumes_existing() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (_, created) = store.get_or_create("s1", || session("s1"));
        assert!(created);
        let (_, created) = store.get_or_create("s1", || session("other"));
        assert!(!created);
        assert_eq!(store.len(), 1);
        assert!(store.get("s1").is_some());
        assert!(store.remove("s1").is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_sessions_in_use() {
        let store = SessionStore::new(Duration::ZERO);
        let (busy, _) = store.get_or_create("busy", || session("busy"));
        store.get_or_create("idle", || session("idle"));
        store.archive("done", ReportConfig::new("run-1"));

        let guard = busy.lock().await;
        assert_eq!(store.purge_expired(), 2);
        drop(guard);

        assert!(store.get("busy").is_some());
        assert!(store.get("idle").is_none());
        assert!(store.completed("done").is_none());
    }

    #[test]
    fn test_archive_lookup() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.archive("s1", ReportConfig::new("run-1"));
        assert_eq!(store.completed("s1").unwrap().source_file_id, "run-1");
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let store = Arc::new(SessionStore::new(Duration::ZERO));
        store.get_or_create("s1", || session("s1"));
        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup(store.clone(), Duration::from_millis(10), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
