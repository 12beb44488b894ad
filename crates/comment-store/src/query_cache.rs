use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use comment_types::{Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment};

use crate::{Result, StorageAdapter};

const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Cache key of one query against the wrapped adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Comments,
    BySource {
        source_id: String,
        source_type: Option<String>,
    },
    Threads {
        source_id: Option<String>,
        source_type: Option<String>,
    },
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |value: &Option<String>| value.clone().unwrap_or_default();
        match self {
            QueryKey::Comments => write!(f, "comments"),
            QueryKey::BySource {
                source_id,
                source_type,
            } => write!(f, "comments:source:{}:{}", source_id, part(source_type)),
            QueryKey::Threads {
                source_id,
                source_type,
            } => write!(f, "threads:{}:{}", part(source_id), part(source_type)),
        }
    }
}

#[derive(Clone)]
enum Cached {
    Comments(Vec<Comment>),
    Threads(Vec<CommentThread>),
}

struct Entry {
    fetched_at: Instant,
    value: Cached,
}

/// Keyed query cache in front of any adapter.
///
/// Reads are served from cache until they are older than the stale time.
/// Successful single-record writes are folded into cached comment lists in
/// place; thread queries are dropped since their grouping may change. Bulk
/// saves and clears drop every entry.
pub struct QueryCacheAdapter<A> {
    inner: A,
    stale_time: Duration,
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

impl<A: StorageAdapter> QueryCacheAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self::with_stale_time(inner, DEFAULT_STALE_TIME)
    }

    pub fn with_stale_time(inner: A, stale_time: Duration) -> Self {
        Self {
            inner,
            stale_time,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Drop every cached query.
    pub fn invalidate_queries(&self) {
        self.lock().clear();
    }

    pub fn is_cached(&self, key: &QueryKey) -> bool {
        self.fresh(key).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh(&self, key: &QueryKey) -> Option<Cached> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() < self.stale_time {
            log::debug!("query cache hit for {}", key);
            return Some(entry.value.clone());
        }
        entries.remove(key);
        None
    }

    fn store(&self, key: QueryKey, value: Cached) {
        self.lock().insert(
            key,
            Entry {
                fetched_at: Instant::now(),
                value,
            },
        );
    }

    /// Apply `f` to every cached comment list, keyed so `f` can tell a
    /// source-filtered list apart. Thread entries are dropped.
    fn update_lists<F>(&self, mut f: F)
    where
        F: FnMut(&QueryKey, &mut Vec<Comment>),
    {
        let mut entries = self.lock();
        entries.retain(|key, entry| match &mut entry.value {
            Cached::Comments(comments) => {
                f(key, comments);
                true
            }
            Cached::Threads(_) => false,
        });
    }

    fn insert_into_lists(&self, comment: &Comment) {
        self.update_lists(|key, comments| {
            let belongs = match key {
                QueryKey::BySource {
                    source_id,
                    source_type,
                } => comment.matches_source(source_id, source_type.as_deref()),
                _ => true,
            };
            if belongs {
                comments.push(comment.clone());
            }
        });
    }

    fn patch_lists(&self, id: &CommentId, patch: &CommentPatch) {
        self.update_lists(|_, comments| {
            if let Some(comment) = comments.iter_mut().find(|c| c.id == *id) {
                patch.apply_to(comment);
            }
        });
    }
}

#[async_trait]
impl<A: StorageAdapter> StorageAdapter for QueryCacheAdapter<A> {
    async fn get_comments(&self) -> Result<Vec<Comment>> {
        if let Some(Cached::Comments(comments)) = self.fresh(&QueryKey::Comments) {
            return Ok(comments);
        }
        let comments = self.inner.get_comments().await?;
        self.store(QueryKey::Comments, Cached::Comments(comments.clone()));
        Ok(comments)
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        let result = self.inner.save_comments(comments).await;
        self.invalidate_queries();
        result
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.inner.add_comment(comment).await?;
        self.insert_into_lists(comment);
        Ok(())
    }

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()> {
        self.inner.update_comment(id, patch).await?;
        self.patch_lists(id, patch);
        Ok(())
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<()> {
        self.inner.delete_comment(id).await?;
        self.update_lists(|_, comments| comments.retain(|c| c.id != *id));
        Ok(())
    }

    async fn clear_all_storage(&self) -> Result<()> {
        let result = self.inner.clear_all_storage().await;
        self.invalidate_queries();
        result
    }

    async fn add_lexical_comment(&self, new: NewComment) -> Result<Comment> {
        let comment = self.inner.add_lexical_comment(new).await?;
        self.insert_into_lists(&comment);
        Ok(comment)
    }

    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> Result<()> {
        let patch = update.clone().into_patch();
        self.inner.update_comment_with_editor_state(id, update).await?;
        self.patch_lists(id, &patch);
        Ok(())
    }

    async fn get_comments_by_source(
        &self,
        source_id: &str,
        source_type: Option<&str>,
    ) -> Result<Vec<Comment>> {
        let key = QueryKey::BySource {
            source_id: source_id.to_string(),
            source_type: source_type.map(String::from),
        };
        if let Some(Cached::Comments(comments)) = self.fresh(&key) {
            return Ok(comments);
        }
        let comments = self
            .inner
            .get_comments_by_source(source_id, source_type)
            .await?;
        self.store(key, Cached::Comments(comments.clone()));
        Ok(comments)
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Vec<CommentThread>> {
        let key = QueryKey::Threads {
            source_id: source_id.map(String::from),
            source_type: source_type.map(String::from),
        };
        if let Some(Cached::Threads(threads)) = self.fresh(&key) {
            return Ok(threads);
        }
        let threads = self
            .inner
            .get_comment_threads(source_id, source_type)
            .await?;
        self.store(key, Cached::Threads(threads.clone()));
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use comment_types::User;

    use super::*;
    use crate::LocalStorageAdapter;

    fn new_comment(content: &str, source_id: &str) -> NewComment {
        NewComment::new(content, "{}", User::new("u1", "Ann"))
            .with_source(Some(source_id.to_string()), None)
    }

    #[test]
    fn test_query_key_display() {
        assert_eq!(QueryKey::Comments.to_string(), "comments");
        assert_eq!(
            QueryKey::BySource {
                source_id: "doc1".into(),
                source_type: Some("demo".into())
            }
            .to_string(),
            "comments:source:doc1:demo"
        );
        assert_eq!(
            QueryKey::Threads {
                source_id: None,
                source_type: None
            }
            .to_string(),
            "threads::"
        );
    }

    #[tokio::test]
    async fn test_add_updates_cached_lists_in_place() {
        let adapter = QueryCacheAdapter::new(LocalStorageAdapter::in_memory());
        assert!(adapter.get_comments().await.unwrap().is_empty());
        assert!(adapter.get_comments_by_source("doc1", None).await.unwrap().is_empty());
        adapter.get_comment_threads(None, None).await.unwrap();

        let created = adapter.add_lexical_comment(new_comment("a", "doc1")).await.unwrap();
        adapter.add_lexical_comment(new_comment("b", "doc2")).await.unwrap();

        assert!(adapter.is_cached(&QueryKey::Comments));
        assert!(!adapter.is_cached(&QueryKey::Threads {
            source_id: None,
            source_type: None
        }));
        assert_eq!(adapter.get_comments().await.unwrap().len(), 2);
        let doc1 = adapter.get_comments_by_source("doc1", None).await.unwrap();
        assert_eq!(doc1, vec![created]);
    }

    #[tokio::test]
    async fn test_update_and_delete_patch_cache() {
        let adapter = QueryCacheAdapter::new(LocalStorageAdapter::in_memory());
        let created = adapter.add_lexical_comment(new_comment("a", "doc1")).await.unwrap();
        adapter.get_comments().await.unwrap();

        adapter
            .update_comment_with_editor_state(&created.id, EditorUpdate::new("edited", "{}"))
            .await
            .unwrap();
        let cached = adapter.get_comments().await.unwrap();
        assert_eq!(cached[0].content, "edited");
        assert!(cached[0].is_edited);
        assert_eq!(cached, adapter.inner().get_comments().await.unwrap());

        adapter.delete_comment(&created.id).await.unwrap();
        assert!(adapter.get_comments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let adapter = QueryCacheAdapter::new(LocalStorageAdapter::in_memory());
        adapter.get_comments().await.unwrap();
        let result = adapter
            .update_comment(&CommentId::from("missing"), &CommentPatch::default())
            .await;
        assert!(result.is_err());
        assert!(adapter.is_cached(&QueryKey::Comments));
    }

    #[tokio::test]
    async fn test_stale_entries_are_refetched() {
        let adapter =
            QueryCacheAdapter::with_stale_time(LocalStorageAdapter::in_memory(), Duration::ZERO);
        adapter.get_comments().await.unwrap();
        assert!(!adapter.is_cached(&QueryKey::Comments));
    }

    #[tokio::test]
    async fn test_save_and_clear_invalidate_everything() {
        let adapter = QueryCacheAdapter::new(LocalStorageAdapter::in_memory());
        adapter.get_comments().await.unwrap();
        adapter.save_comments(&[]).await.unwrap();
        assert!(!adapter.is_cached(&QueryKey::Comments));

        adapter.get_comments().await.unwrap();
        adapter.clear_all_storage().await.unwrap();
        assert!(!adapter.is_cached(&QueryKey::Comments));
    }
}
