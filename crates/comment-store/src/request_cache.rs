use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use comment_types::{Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment};

use crate::{Result, ServerActionAdapter, StorageAdapter};

type SourceKey = (Option<String>, Option<String>);

#[derive(Default)]
struct Scope {
    comments: Option<Vec<Comment>>,
    by_source: HashMap<SourceKey, Vec<Comment>>,
    threads: HashMap<SourceKey, Vec<CommentThread>>,
}

/// Memoizes reads of the wrapped adapter for the lifetime of one request.
///
/// `get_comments`, `get_comments_by_source` and `get_comment_threads` hit the
/// inner adapter at most once per scope and arguments. Any write drops the memo, and so does
/// [`reset_request_scope`](Self::reset_request_scope), which the host calls
/// when a new request begins.
pub struct RequestCache<A> {
    inner: A,
    scope: Mutex<Scope>,
}

/// Server-action adapter with request-scoped read memoization.
pub type CachedServerActionAdapter = RequestCache<ServerActionAdapter>;

impl<A: StorageAdapter> RequestCache<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            scope: Mutex::new(Scope::default()),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn reset_request_scope(&self) {
        *self.lock() = Scope::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Scope> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self) {
        log::debug!("request cache invalidated by write");
        self.reset_request_scope();
    }
}

#[async_trait]
impl<A: StorageAdapter> StorageAdapter for RequestCache<A> {
    async fn get_comments(&self) -> Result<Vec<Comment>> {
        if let Some(comments) = self.lock().comments.clone() {
            return Ok(comments);
        }
        let comments = self.inner.get_comments().await?;
        self.lock().comments = Some(comments.clone());
        Ok(comments)
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        let result = self.inner.save_comments(comments).await;
        self.invalidate();
        result
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let result = self.inner.add_comment(comment).await;
        self.invalidate();
        result
    }

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()> {
        let result = self.inner.update_comment(id, patch).await;
        self.invalidate();
        result
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<()> {
        let result = self.inner.delete_comment(id).await;
        self.invalidate();
        result
    }

    async fn clear_all_storage(&self) -> Result<()> {
        let result = self.inner.clear_all_storage().await;
        self.invalidate();
        result
    }

    async fn add_lexical_comment(&self, new: NewComment) -> Result<Comment> {
        let result = self.inner.add_lexical_comment(new).await;
        self.invalidate();
        result
    }

    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> Result<()> {
        let result = self.inner.update_comment_with_editor_state(id, update).await;
        self.invalidate();
        result
    }

    async fn get_comments_by_source(
        &self,
        source_id: &str,
        source_type: Option<&str>,
    ) -> Result<Vec<Comment>> {
        let key = (Some(source_id.to_string()), source_type.map(String::from));
        if let Some(comments) = self.lock().by_source.get(&key).cloned() {
            return Ok(comments);
        }
        let comments = self
            .inner
            .get_comments_by_source(source_id, source_type)
            .await?;
        self.lock().by_source.insert(key, comments.clone());
        Ok(comments)
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Vec<CommentThread>> {
        let key = (source_id.map(String::from), source_type.map(String::from));
        if let Some(threads) = self.lock().threads.get(&key).cloned() {
            return Ok(threads);
        }
        let threads = self.inner.get_comment_threads(source_id, source_type).await?;
        self.lock().threads.insert(key, threads.clone());
        Ok(threads)
    }
}
