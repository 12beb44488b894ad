use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use comment_store::{
    FileStore, KeyValueStore, LocalStorageAdapter, MemoryStore, STORAGE_KEY, StorageAdapter,
};
use comment_types::{
    Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment, User,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(#[from] comment_store::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// A file-backed local adapter living in a temporary directory.
pub struct TestStore {
    pub adapter: LocalStorageAdapter<FileStore>,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let adapter = LocalStorageAdapter::new(FileStore::new(dir.path())?);
        Ok(Self { adapter, _dir: dir })
    }

    pub fn path(&self) -> &Path {
        self._dir.path()
    }

    /// The stored collection as raw JSON, `None` when nothing was written.
    pub fn raw(&self) -> Result<Option<Value>> {
        match self.adapter.store().get(STORAGE_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Reopen the same directory through a fresh adapter.
    pub fn reopen(&self) -> Result<LocalStorageAdapter<FileStore>> {
        Ok(LocalStorageAdapter::new(FileStore::new(self.path())?))
    }
}

pub fn alice() -> User {
    User {
        email: Some("alice@example.com".to_string()),
        ..User::new("user-alice", "Alice")
    }
}

pub fn bob() -> User {
    User::new("user-bob", "Bob")
}

pub fn text(value: &str) -> Value {
    json!({ "type": "text", "text": value })
}

pub fn mention(value: &str) -> Value {
    json!({ "type": "beautifulMention", "trigger": "@", "value": value, "data": { "id": value } })
}

pub fn tag(value: &str) -> Value {
    json!({ "type": "beautifulMention", "trigger": "#", "value": value })
}

/// A serialized single-paragraph document made of `nodes`.
pub fn doc(nodes: Vec<Value>) -> String {
    json!({
        "root": {
            "type": "root",
            "children": [{ "type": "paragraph", "children": nodes }]
        }
    })
    .to_string()
}

/// A serialized document holding one text node.
pub fn editor_state(content: &str) -> String {
    doc(vec![text(content)])
}

/// A stored comment with a fixed id and a creation time `minutes` after the epoch.
pub fn comment_at(id: &str, parent: Option<&str>, author: User, minutes: i64) -> Comment {
    let mut comment = NewComment::new(id, editor_state(id), author)
        .with_parent(parent.map(CommentId::from))
        .into_comment();
    comment.id = CommentId::from(id);
    comment.created_at = DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(minutes);
    comment.updated_at = comment.created_at;
    comment
}

/// An adapter operation, as counted and scripted by [`ScriptedAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetComments,
    SaveComments,
    AddComment,
    UpdateComment,
    DeleteComment,
    ClearAllStorage,
    AddLexicalComment,
    UpdateWithEditorState,
    GetCommentThreads,
}

/// In-memory adapter that counts calls, fails on demand and can park an
/// operation until the test releases it.
pub struct ScriptedAdapter {
    inner: LocalStorageAdapter,
    calls: Mutex<HashMap<Op, usize>>,
    failing: Mutex<HashSet<Op>>,
    held: Mutex<HashMap<Op, Arc<Notify>>>,
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self {
            inner: LocalStorageAdapter::in_memory(),
            calls: Mutex::default(),
            failing: Mutex::default(),
            held: Mutex::default(),
        }
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter whose store already holds `comments`.
    pub fn with_comments(comments: &[Comment]) -> Result<Self> {
        let store = MemoryStore::new();
        store.set(STORAGE_KEY, &serde_json::to_string(comments)?)?;
        Ok(Self {
            inner: LocalStorageAdapter::new(store),
            ..Self::default()
        })
    }

    pub fn calls(&self, op: Op) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Make every following call of `op` fail.
    pub fn fail(&self, op: Op) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: Op) {
        lock(&self.failing).remove(&op);
    }

    /// Park the next calls of `op` until [`release`](Self::release).
    pub fn hold(&self, op: Op) {
        lock(&self.held).insert(op, Arc::new(Notify::new()));
    }

    pub fn release(&self, op: Op) {
        if let Some(notify) = lock(&self.held).remove(&op) {
            notify.notify_one();
        }
    }

    /// What the store holds, read without counting a call.
    pub async fn stored(&self) -> Vec<Comment> {
        self.inner.get_comments().await.unwrap_or_default()
    }

    async fn begin(&self, op: Op) -> comment_store::Result<()> {
        *lock(&self.calls).entry(op).or_default() += 1;
        let held = lock(&self.held).get(&op).cloned();
        if let Some(notify) = held {
            notify.notified().await;
        }
        if lock(&self.failing).contains(&op) {
            return Err(comment_store::Error::Internal(format!(
                "scripted failure of {:?}",
                op
            )));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl StorageAdapter for ScriptedAdapter {
    async fn get_comments(&self) -> comment_store::Result<Vec<Comment>> {
        self.begin(Op::GetComments).await?;
        self.inner.get_comments().await
    }

    async fn save_comments(&self, comments: &[Comment]) -> comment_store::Result<()> {
        self.begin(Op::SaveComments).await?;
        self.inner.save_comments(comments).await
    }

    async fn add_comment(&self, comment: &Comment) -> comment_store::Result<()> {
        self.begin(Op::AddComment).await?;
        self.inner.add_comment(comment).await
    }

    async fn update_comment(
        &self,
        id: &CommentId,
        patch: &CommentPatch,
    ) -> comment_store::Result<()> {
        self.begin(Op::UpdateComment).await?;
        self.inner.update_comment(id, patch).await
    }

    async fn delete_comment(&self, id: &CommentId) -> comment_store::Result<()> {
        self.begin(Op::DeleteComment).await?;
        self.inner.delete_comment(id).await
    }

    async fn clear_all_storage(&self) -> comment_store::Result<()> {
        self.begin(Op::ClearAllStorage).await?;
        self.inner.clear_all_storage().await
    }

    async fn add_lexical_comment(&self, new: NewComment) -> comment_store::Result<Comment> {
        self.begin(Op::AddLexicalComment).await?;
        self.inner.add_lexical_comment(new).await
    }

    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> comment_store::Result<()> {
        self.begin(Op::UpdateWithEditorState).await?;
        self.inner.update_comment_with_editor_state(id, update).await
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> comment_store::Result<Vec<CommentThread>> {
        self.begin(Op::GetCommentThreads).await?;
        self.inner.get_comment_threads(source_id, source_type).await
    }
}
