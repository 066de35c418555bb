//! Per-session state: the project file map and the change log
//!
//! A session is scoped to one project: the same session id used against two
//! project roots gives two independent sessions. Both pieces of state live in
//! the key-value cache under `session:<id>@<root>:files` and
//! `session:<id>@<root>:changes`. The cache only accelerates things: any cache
//! failure degrades to rebuilding the file map from disk, and the change log
//! is also held in process.
//!
//! Every read-modify-write of a session goes through [`SessionStore::lock`],
//! which hands out at most one [`SessionContext`] per session at a time.
//! In-process slots idle for longer than the cache TTL are dropped.

use crate::fs::{FsError, ProjectFs};
use crate::kv::{CacheError, KvCache};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tailor_core::{ChangeLog, FileMap, ModificationChange};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub recent_changes: usize,
    pub retention: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            recent_changes: 5,
            retention: 200,
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    pub project_root: PathBuf,
    pub started_at: DateTime<Utc>,
    /// `<id>@<root>`, the prefix of every cache key of this session
    scope: String,
    change_log: ChangeLog,
    hydrated: bool,
}

impl SessionState {
    fn new(session_id: &str, project_root: PathBuf, scope: String) -> Self {
        let started_at = Utc::now();
        Self {
            session_id: session_id.to_string(),
            project_root,
            started_at,
            scope,
            change_log: ChangeLog::new(started_at),
            hydrated: false,
        }
    }
}

struct Slot {
    state: Arc<AsyncMutex<SessionState>>,
    last_used: Instant,
}

pub struct SessionStore {
    cache: Arc<dyn KvCache>,
    settings: SessionSettings,
    sessions: Mutex<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn KvCache>, settings: SessionSettings) -> Self {
        Self {
            cache,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Take the single-writer lock for a session of `project`, creating it on
    /// first use.
    pub async fn lock(&self, session_id: &str, project: ProjectFs) -> SessionContext {
        let root = canonical_root(project.root());
        let scope = session_scope(session_id, &root);
        let slot = {
            let mut sessions = match self.sessions.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            evict_idle(&mut sessions, now, self.settings.ttl);
            let slot = sessions.entry(scope.clone()).or_insert_with(|| Slot {
                state: Arc::new(AsyncMutex::new(SessionState::new(session_id, root, scope.clone()))),
                last_used: now,
            });
            slot.last_used = now;
            Arc::clone(&slot.state)
        };

        let mut state = slot.lock_owned().await;
        if !state.hydrated {
            hydrate_change_log(self.cache.as_ref(), &mut state).await;
        }

        SessionContext {
            state,
            cache: Arc::clone(&self.cache),
            settings: self.settings,
            project,
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}

/// Drop slots nobody holds or waits on that have been idle past `ttl`.
fn evict_idle(sessions: &mut HashMap<String, Slot>, now: Instant, ttl: Duration) {
    sessions.retain(|_, slot| Arc::strong_count(&slot.state) > 1 || now.duration_since(slot.last_used) < ttl);
}

fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

fn session_scope(session_id: &str, root: &Path) -> String {
    format!("{}@{}", session_id, root.display())
}

async fn hydrate_change_log(cache: &dyn KvCache, state: &mut SessionState) {
    let key = changes_key(&state.scope);
    match cache.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_str::<ChangeLog>(&raw) {
            Ok(log) => {
                state.started_at = log.started_at;
                state.change_log = log;
            }
            Err(err) => {
                tracing::warn!(session = %state.session_id, error = %err, "cached change log is unreadable; starting fresh");
            }
        },
        Ok(None) => {}
        Err(err) => {
            tracing::debug!(session = %state.session_id, error = %err, "change log cache unavailable");
        }
    }
    state.hydrated = true;
}

fn files_key(scope: &str) -> String {
    format!("session:{}:files", scope)
}

fn changes_key(scope: &str) -> String {
    format!("session:{}:changes", scope)
}

/// Exclusive handle on one session's state for the duration of a request
pub struct SessionContext {
    state: OwnedMutexGuard<SessionState>,
    cache: Arc<dyn KvCache>,
    settings: SessionSettings,
    project: ProjectFs,
}

impl SessionContext {
    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    /// Cached file map, or a fresh scan when the cache misses or fails.
    pub async fn get_files(&self) -> Result<FileMap, FsError> {
        match self.cached_files().await {
            Ok(Some(files)) => return Ok(files),
            Ok(None) => {
                tracing::debug!(session = %self.session_id(), "file map cache miss; scanning project");
            }
            Err(err) => {
                tracing::warn!(session = %self.session_id(), error = %err, "file map cache failed; scanning project");
            }
        }

        let files = self.project.scan_async().await?;
        self.set_files(&files).await;
        Ok(files)
    }

    async fn cached_files(&self) -> Result<Option<FileMap>, CacheError> {
        let key = files_key(&self.state.scope);
        match self.cache.get(&key).await? {
            Some(raw) => serde_json::from_str::<FileMap>(&raw)
                .map(Some)
                .map_err(|e| CacheError::codec(key, e)),
            None => Ok(None),
        }
    }

    /// Store the file map. Returns whether the cache accepted it; a failure
    /// only means the next `get_files` rescans.
    pub async fn set_files(&self, files: &FileMap) -> bool {
        let key = files_key(&self.state.scope);
        let encoded = match serde_json::to_string(files) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode file map for cache");
                return false;
            }
        };
        match self.cache.set_with_ttl(&key, encoded, self.settings.ttl).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(session = %self.session_id(), error = %err, "file map not cached");
                false
            }
        }
    }

    /// Append one entry; the log is compacted past the retention bound.
    pub async fn append_change(&mut self, change: ModificationChange) {
        let retention = self.settings.retention;
        let log = &mut self.state.change_log;
        log.push(change);
        log.compact(retention);

        let encoded = match serde_json::to_string(&self.state.change_log) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode change log for cache");
                return;
            }
        };
        let key = changes_key(&self.state.scope);
        if let Err(err) = self.cache.set_with_ttl(&key, encoded, self.settings.ttl).await {
            tracing::debug!(session = %self.session_id(), error = %err, "change log not cached");
        }
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.state.change_log
    }

    pub fn recent_changes_summary(&self) -> String {
        self.state
            .change_log
            .recent_summary(self.settings.recent_changes, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::PathPolicy;
    use crate::kv::{DisabledCache, MokaKvCache};
    use std::fs;
    use tailor_core::{Approach, ChangeType};

    fn project() -> (tempfile::TempDir, ProjectFs) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/App.tsx"), "export default function App() {}\n").unwrap();
        let project = ProjectFs::new(dir.path(), PathPolicy::Confined);
        (dir, project)
    }

    #[tokio::test]
    async fn disabled_cache_matches_healthy_cache() {
        let (_dir, project) = project();
        let healthy = SessionStore::new(Arc::new(MokaKvCache::default()), SessionSettings::default());
        let broken = SessionStore::new(Arc::new(DisabledCache), SessionSettings::default());

        let from_healthy = healthy.lock("s1", project.clone()).await.get_files().await.unwrap();
        let from_broken = broken.lock("s1", project.clone()).await.get_files().await.unwrap();
        assert_eq!(from_healthy, from_broken);
        assert!(from_broken.contains_key("src/App.tsx"));
    }

    #[tokio::test]
    async fn cached_map_is_served_until_replaced() {
        let (dir, project) = project();
        let store = SessionStore::new(Arc::new(MokaKvCache::default()), SessionSettings::default());
        let session = store.lock("s1", project).await;

        let files = session.get_files().await.unwrap();
        fs::write(dir.path().join("src/Extra.tsx"), "export const Extra = 1;\n").unwrap();
        assert_eq!(session.get_files().await.unwrap(), files);

        let mut updated = files.clone();
        updated.remove("src/App.tsx");
        assert!(session.set_files(&updated).await);
        assert_eq!(session.get_files().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn change_log_survives_relocking_and_summarizes() {
        let (_dir, project) = project();
        let store = SessionStore::new(Arc::new(DisabledCache), SessionSettings::default());
        {
            let mut session = store.lock("s1", project.clone()).await;
            for n in 0..7 {
                session
                    .append_change(ModificationChange::new(
                        ChangeType::Modified,
                        "src/App.tsx",
                        format!("edit {}", n),
                        Approach::NodeEdit,
                    ))
                    .await;
            }
        }
        let session = store.lock("s1", project).await;
        assert_eq!(session.change_log().entries.len(), 7);
        let summary = session.recent_changes_summary();
        assert!(summary.contains("7 change(s) across 1 file(s)"));
        assert!(!summary.contains("edit 1"));
        assert!(summary.contains("edit 6"));
    }

    #[tokio::test]
    async fn second_lock_waits_for_the_first() {
        let (_dir, project) = project();
        let store = Arc::new(SessionStore::new(
            Arc::new(MokaKvCache::default()),
            SessionSettings::default(),
        ));
        let first = store.lock("s1", project.clone()).await;

        let waiter = {
            let store = Arc::clone(&store);
            let project = project.clone();
            tokio::spawn(async move {
                let _second = store.lock("s1", project).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn same_session_id_on_two_projects_stays_separate() {
        let (dir_a, project_a) = project();
        let (dir_b, project_b) = project();
        fs::write(dir_b.path().join("src/Only.tsx"), "export const Only = 1;\n").unwrap();
        let store = SessionStore::new(Arc::new(MokaKvCache::default()), SessionSettings::default());

        {
            let mut session = store.lock("s1", project_a.clone()).await;
            let files = session.get_files().await.unwrap();
            assert!(!files.contains_key("src/Only.tsx"));
            session
                .append_change(ModificationChange::new(
                    ChangeType::Modified,
                    "src/App.tsx",
                    "edit in a",
                    Approach::NodeEdit,
                ))
                .await;
        }

        let session = store.lock("s1", project_b).await;
        let files = session.get_files().await.unwrap();
        assert!(files.contains_key("src/Only.tsx"));
        assert!(files.values().all(|file| file.path.starts_with(dir_b.path())));
        assert_eq!(session.change_log().total_changes(), 0);
        drop(session);

        let session = store.lock("s1", project_a).await;
        assert_eq!(session.change_log().total_changes(), 1);
        assert!(session.get_files().await.unwrap().values().all(|file| file.path.starts_with(dir_a.path())));
    }

    #[tokio::test]
    async fn idle_slots_are_evicted_but_held_ones_are_kept() {
        let (_dir, project) = project();
        let settings = SessionSettings {
            ttl: Duration::from_millis(20),
            ..SessionSettings::default()
        };
        let store = SessionStore::new(Arc::new(DisabledCache), settings);

        drop(store.lock("idle", project.clone()).await);
        let held = store.lock("held", project.clone()).await;
        assert_eq!(store.slot_count(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let _fresh = store.lock("fresh", project).await;
        assert_eq!(store.slot_count(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn other_sessions_are_not_blocked() {
        let (_dir, project) = project();
        let store = SessionStore::new(Arc::new(MokaKvCache::default()), SessionSettings::default());
        let _first = store.lock("s1", project.clone()).await;
        let other = tokio::time::timeout(Duration::from_secs(1), store.lock("s2", project)).await;
        assert!(other.is_ok());
    }
}
