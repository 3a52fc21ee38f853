//! Todo read/write orchestration.
//!
//! Reads follow the cache-aside pattern: the cached list is served when present,
//! otherwise the store is queried and the cache repopulated. A cache that cannot
//! be reached degrades the read to the store; a cached payload that cannot be
//! decoded fails the read. Writes go to the store only, each in its own
//! transaction, and optionally evict the cached list after commit.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::cache::{CACHE_KEY_TODOS, CacheStore, DEFAULT_TODOS_TTL};
use crate::application::repos::{RepoError, TodosRepo, TodosWriteRepo, UpdateTodoParams};
use crate::domain::entities::TodoRecord;
use crate::domain::error::DomainError;
use crate::domain::todos::{TodoDraft, TodoPatch};

pub const METRIC_CACHE_HIT: &str = "todos_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "todos_cache_miss_total";
pub const METRIC_CACHE_ERROR: &str = "todos_cache_error_total";
pub const METRIC_CACHE_POPULATE_FAILED: &str = "todos_cache_populate_failed_total";
pub const METRIC_STORE_LIST_MS: &str = "todos_store_list_ms";

const TARGET: &str = "todos::application::todos";

#[derive(Debug, Error)]
pub enum TodoError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
    #[error("todo `{0}` not found")]
    NotFound(Uuid),
    #[error("cached todo list could not be decoded: {0}")]
    CacheCorrupt(String),
    #[error(transparent)]
    Store(#[from] RepoError),
}

/// How the orchestrator uses its cache.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Duration,
    /// Evict the cached list after every committed write instead of waiting
    /// for the TTL.
    pub invalidate_on_write: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TODOS_TTL,
            invalidate_on_write: true,
        }
    }
}

#[derive(Clone)]
pub struct TodoService {
    reader: Arc<dyn TodosRepo>,
    writer: Arc<dyn TodosWriteRepo>,
    cache: Option<Arc<dyn CacheStore>>,
    policy: CachePolicy,
}

impl TodoService {
    pub fn new(reader: Arc<dyn TodosRepo>, writer: Arc<dyn TodosWriteRepo>) -> Self {
        Self {
            reader,
            writer,
            cache: None,
            policy: CachePolicy::default(),
        }
    }

    pub fn with_cache(self, cache: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        self.with_cache_opt(Some(cache), policy)
    }

    pub fn with_cache_opt(
        mut self,
        cache: Option<Arc<dyn CacheStore>>,
        policy: CachePolicy,
    ) -> Self {
        self.cache = cache;
        self.policy = policy;
        self
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn list_todos(&self) -> Result<Vec<TodoRecord>, TodoError> {
        let Some(cache) = self.cache.as_ref() else {
            return self.load_from_store().await;
        };

        match cache.get(CACHE_KEY_TODOS).await {
            Ok(Some(payload)) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(target: TARGET, bytes = payload.len(), "cache hit");
                serde_json::from_slice(&payload).map_err(|err| {
                    warn!(target: TARGET, error = %err, "cached todo list is corrupt");
                    TodoError::CacheCorrupt(err.to_string())
                })
            }
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(target: TARGET, "cache miss, loading from store");
                let todos = self.load_from_store().await?;
                self.populate(cache.as_ref(), &todos).await;
                Ok(todos)
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(
                    target: TARGET,
                    error = %err,
                    "cache read failed, serving from store"
                );
                self.load_from_store().await
            }
        }
    }

    pub async fn create_todo(&self, draft: TodoDraft) -> Result<TodoRecord, TodoError> {
        let todo = draft.into_new_todo()?;
        let created = self.writer.create_todo(todo).await?;
        info!(target: TARGET, id = %created.id, "todo created");
        self.invalidate_after_write().await;
        Ok(created)
    }

    /// `id` always comes from the caller's path; the patch cannot change it.
    pub async fn update_todo(&self, id: Uuid, patch: TodoPatch) -> Result<TodoRecord, TodoError> {
        let patch = patch.normalized()?;
        let updated = self
            .writer
            .update_todo(UpdateTodoParams { id, patch })
            .await?
            .ok_or(TodoError::NotFound(id))?;
        info!(target: TARGET, id = %updated.id, "todo updated");
        self.invalidate_after_write().await;
        Ok(updated)
    }

    pub async fn delete_todo(&self, id: Uuid) -> Result<(), TodoError> {
        let affected = self.writer.delete_todo(id).await?;
        if affected == 0 {
            return Err(TodoError::NotFound(id));
        }
        info!(target: TARGET, id = %id, "todo deleted");
        self.invalidate_after_write().await;
        Ok(())
    }

    async fn load_from_store(&self) -> Result<Vec<TodoRecord>, TodoError> {
        let started = Instant::now();
        let todos = self.reader.list_todos().await?;
        histogram!(METRIC_STORE_LIST_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(target: TARGET, count = todos.len(), "loaded todos from store");
        Ok(todos)
    }

    async fn populate(&self, cache: &dyn CacheStore, todos: &[TodoRecord]) {
        let payload = match serde_json::to_vec(todos) {
            Ok(payload) => payload,
            Err(err) => {
                counter!(METRIC_CACHE_POPULATE_FAILED).increment(1);
                warn!(target: TARGET, error = %err, "failed to encode todo list for cache");
                return;
            }
        };

        if let Err(err) = cache.set(CACHE_KEY_TODOS, payload, self.policy.ttl).await {
            counter!(METRIC_CACHE_POPULATE_FAILED).increment(1);
            warn!(target: TARGET, error = %err, "failed to populate todo cache");
            return;
        }

        debug!(
            target: TARGET,
            ttl_secs = self.policy.ttl.as_secs(),
            "todo list cached"
        );
    }

    async fn invalidate_after_write(&self) {
        if !self.policy.invalidate_on_write {
            return;
        }
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        if let Err(err) = cache.delete(CACHE_KEY_TODOS).await {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(
                target: TARGET,
                error = %err,
                "failed to evict cached todo list; it expires with its TTL"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::*;
    use crate::application::cache::CacheError;
    use crate::domain::todos::NewTodo;
    use crate::infra::cache::MemoryCache;

    #[derive(Default)]
    struct InMemoryTodos {
        rows: Mutex<HashMap<Uuid, TodoRecord>>,
        list_calls: AtomicUsize,
        write_calls: AtomicUsize,
        fail_updates: AtomicBool,
    }

    impl InMemoryTodos {
        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn write_calls(&self) -> usize {
            self.write_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TodosRepo for InMemoryTodos {
        async fn list_todos(&self) -> Result<Vec<TodoRecord>, RepoError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut todos: Vec<_> = self.rows.lock().await.values().cloned().collect();
            todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(todos)
        }
    }

    #[async_trait]
    impl TodosWriteRepo for InMemoryTodos {
        async fn create_todo(&self, todo: NewTodo) -> Result<TodoRecord, RepoError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().await;
            if rows.contains_key(&todo.id) {
                return Err(RepoError::Duplicate {
                    constraint: "todos_pkey".to_string(),
                });
            }
            let now = OffsetDateTime::now_utc();
            let record = TodoRecord {
                id: todo.id,
                owner_id: todo.owner_id,
                description: todo.description,
                completed: todo.completed,
                created_at: now,
                updated_at: now,
            };
            rows.insert(record.id, record.clone());
            Ok(record)
        }

        async fn update_todo(
            &self,
            params: UpdateTodoParams,
        ) -> Result<Option<TodoRecord>, RepoError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(RepoError::from_persistence("connection reset"));
            }
            let mut rows = self.rows.lock().await;
            let Some(row) = rows.get_mut(&params.id) else {
                return Ok(None);
            };
            let UpdateTodoParams { patch, .. } = params;
            if let Some(owner_id) = patch.owner_id {
                row.owner_id = owner_id;
            }
            if let Some(description) = patch.description {
                row.description = description;
            }
            if let Some(completed) = patch.completed {
                row.completed = completed;
            }
            row.updated_at = OffsetDateTime::now_utc().max(row.created_at);
            Ok(Some(row.clone()))
        }

        async fn delete_todo(&self, id: Uuid) -> Result<u64, RepoError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            Ok(u64::from(self.rows.lock().await.remove(&id).is_some()))
        }
    }

    /// Cache double that can be switched offline or preloaded with raw bytes.
    #[derive(Default)]
    struct ScriptedCache {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        offline: AtomicBool,
        reject_writes: AtomicBool,
        sets: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl ScriptedCache {
        fn offline() -> Self {
            let cache = Self::default();
            cache.offline.store(true, Ordering::SeqCst);
            cache
        }

        async fn preload(&self, key: &str, value: &[u8]) {
            self.entries
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
        }

        async fn raw(&self, key: &str) -> Option<Vec<u8>> {
            self.entries.lock().await.get(key).cloned()
        }

        fn check_online(&self) -> Result<(), CacheError> {
            if self.offline.load(Ordering::SeqCst) {
                Err(CacheError::unavailable("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheStore for ScriptedCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.check_online()?;
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            self.check_online()?;
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(CacheError::unavailable("OOM command not allowed"));
            }
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().await.insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.check_online()?;
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().await.remove(key);
            Ok(())
        }

        async fn ping(&self) -> Result<(), CacheError> {
            self.check_online()
        }
    }

    fn draft(owner_id: &str, description: &str) -> TodoDraft {
        TodoDraft {
            owner_id: owner_id.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    fn service(
        repo: &Arc<InMemoryTodos>,
        cache: Option<Arc<dyn CacheStore>>,
        invalidate_on_write: bool,
    ) -> TodoService {
        TodoService::new(repo.clone(), repo.clone()).with_cache_opt(
            cache,
            CachePolicy {
                ttl: DEFAULT_TODOS_TTL,
                invalidate_on_write,
            },
        )
    }

    #[tokio::test]
    async fn create_then_list_round_trips_fields() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);

        let created = todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");
        assert!(!created.completed);
        assert_eq!(created.created_at, created.updated_at);

        let listed = todos.list_todos().await.expect("list succeeds");
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        let todos = service(&repo, Some(cache.clone()), false);
        todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");

        let first = todos.list_todos().await.expect("first read");
        let cached = cache.raw(CACHE_KEY_TODOS).await.expect("cache populated");
        let second = todos.list_todos().await.expect("second read");

        assert_eq!(repo.list_calls(), 1);
        assert_eq!(first, second);
        assert_eq!(
            cache.raw(CACHE_KEY_TODOS).await.as_deref(),
            Some(cached.as_slice())
        );
    }

    #[tokio::test]
    async fn empty_store_is_cached_as_empty_list() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        let todos = service(&repo, Some(cache.clone()), false);

        assert!(todos.list_todos().await.expect("read").is_empty());
        assert_eq!(
            cache.raw(CACHE_KEY_TODOS).await.as_deref(),
            Some(b"[]".as_slice())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn read_after_ttl_goes_back_to_store() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let todos = service(&repo, Some(cache), false);

        todos.list_todos().await.expect("first read");
        todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");

        let stale = todos.list_todos().await.expect("cached read");
        assert!(stale.is_empty());
        assert_eq!(repo.list_calls(), 1);

        tokio::time::advance(DEFAULT_TODOS_TTL + Duration::from_secs(1)).await;

        let fresh = todos.list_todos().await.expect("read after expiry");
        assert_eq!(fresh.len(), 1);
        assert_eq!(repo.list_calls(), 2);
    }

    #[tokio::test]
    async fn corrupt_cache_payload_fails_the_read() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        cache.preload(CACHE_KEY_TODOS, b"{not json").await;
        let todos = service(&repo, Some(cache), false);

        let err = todos.list_todos().await.unwrap_err();
        assert!(matches!(err, TodoError::CacheCorrupt(_)));
        assert_eq!(repo.list_calls(), 0);
    }

    #[tokio::test]
    async fn partial_cached_record_is_treated_as_corrupt() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        cache
            .preload(
                CACHE_KEY_TODOS,
                br#"[{"id":"6f1c1b5e-8a4f-4b8e-9a59-2c1f0d1f6a11","description":"x"}]"#,
            )
            .await;
        let todos = service(&repo, Some(cache), false);

        assert!(matches!(
            todos.list_todos().await,
            Err(TodoError::CacheCorrupt(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_cache_degrades_to_store() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::offline());
        let todos = service(&repo, Some(cache.clone()), true);

        let created = todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("writes never consult the cache");
        let listed = todos.list_todos().await.expect("read degrades to store");

        assert_eq!(listed, vec![created]);
        assert_eq!(repo.list_calls(), 1);
        assert_eq!(cache.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_cache_population_does_not_fail_the_read() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        cache.reject_writes.store(true, Ordering::SeqCst);
        let todos = service(&repo, Some(cache.clone()), false);

        todos.list_todos().await.expect("read succeeds");
        assert!(cache.raw(CACHE_KEY_TODOS).await.is_none());
    }

    #[tokio::test]
    async fn writes_evict_cached_list_when_enabled() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        let todos = service(&repo, Some(cache.clone()), true);

        todos.list_todos().await.expect("prime cache");
        let created = todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");

        assert!(cache.raw(CACHE_KEY_TODOS).await.is_none());
        assert_eq!(
            todos.list_todos().await.expect("fresh read"),
            vec![created]
        );
        assert_eq!(repo.list_calls(), 2);
    }

    #[tokio::test]
    async fn writes_leave_cache_alone_when_eviction_disabled() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        let todos = service(&repo, Some(cache.clone()), false);

        todos.list_todos().await.expect("prime cache");
        todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");

        assert_eq!(cache.deletes.load(Ordering::SeqCst), 0);
        assert!(todos.list_todos().await.expect("stale read").is_empty());
    }

    #[tokio::test]
    async fn create_rejects_missing_fields_before_store() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);

        let empty_description = todos.create_todo(draft("u1", "")).await.unwrap_err();
        let empty_owner = todos.create_todo(draft("", "buy milk")).await.unwrap_err();

        assert!(matches!(empty_description, TodoError::InvalidInput(_)));
        assert!(matches!(empty_owner, TodoError::InvalidInput(_)));
        assert_eq!(repo.write_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_identifier_is_a_store_error() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);
        let id = Uuid::new_v4();
        let with_id = |description: &str| TodoDraft {
            id: Some(id),
            ..draft("u1", description)
        };

        todos.create_todo(with_id("first")).await.expect("first");
        let err = todos.create_todo(with_id("second")).await.unwrap_err();

        assert!(matches!(
            err,
            TodoError::Store(RepoError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn update_forces_path_identifier_and_keeps_created_at() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);
        let created = todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");
        tokio::time::sleep(Duration::from_millis(5)).await;

        let updated = todos
            .update_todo(
                created.id,
                TodoPatch {
                    description: Some("buy oat milk".to_string()),
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("update succeeds");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.owner_id, "u1");
        assert_eq!(updated.description, "buy oat milk");
        assert!(updated.completed);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);
        let id = Uuid::new_v4();

        let err = todos
            .update_todo(
                id,
                TodoPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::NotFound(missing) if missing == id));
        assert!(repo.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_not_found() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, true);
        todos
            .create_todo(draft("u1", "keep me"))
            .await
            .expect("create succeeds");

        let err = todos.delete_todo(Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, TodoError::NotFound(_)));
        assert_eq!(repo.rows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_update_surfaces_store_error_without_eviction() {
        let repo = Arc::new(InMemoryTodos::default());
        let cache = Arc::new(ScriptedCache::default());
        let todos = service(&repo, Some(cache.clone()), true);
        let created = todos
            .create_todo(draft("u1", "buy milk"))
            .await
            .expect("create succeeds");
        todos.list_todos().await.expect("prime cache");
        repo.fail_updates.store(true, Ordering::SeqCst);

        let err = todos
            .update_todo(
                created.id,
                TodoPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::Store(RepoError::Persistence(_))));
        assert!(cache.raw(CACHE_KEY_TODOS).await.is_some());
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_identifiers() {
        let repo = Arc::new(InMemoryTodos::default());
        let todos = service(&repo, None, false);

        let handles: Vec<_> = (0..64)
            .map(|n| {
                let todos = todos.clone();
                tokio::spawn(async move {
                    todos
                        .create_todo(draft("u1", &format!("todo {n}")))
                        .await
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let todo = handle.await.expect("task joins").expect("create succeeds");
            assert!(ids.insert(todo.id));
        }
        assert_eq!(ids.len(), 64);
    }

    proptest! {
        #[test]
        fn generated_identifiers_never_repeat(count in 1usize..2000) {
            let mut seen = HashSet::with_capacity(count);
            for _ in 0..count {
                let todo = draft("u1", "x").into_new_todo().expect("valid draft");
                prop_assert!(seen.insert(todo.id));
            }
        }
    }
}
