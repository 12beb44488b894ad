use async_trait::async_trait;
use comment_types::{Comment, CommentId, CommentPatch};

use crate::kv::{KeyValueStore, MemoryStore};
use crate::{Error, Result, StorageAdapter};

/// Key under which the JSON comment array is stored.
pub const STORAGE_KEY: &str = "lexical-comments";

/// Adapter persisting the whole comment collection as one JSON array in a
/// [`KeyValueStore`]. Timestamps are written as ISO 8601 strings and parsed
/// back into dates on read.
pub struct LocalStorageAdapter<S = MemoryStore> {
    store: S,
    key: String,
}

impl LocalStorageAdapter<MemoryStore> {
    /// An adapter over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: KeyValueStore> LocalStorageAdapter<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, STORAGE_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read(&self) -> Result<Vec<Comment>> {
        match self.store.get(&self.key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Read-modify-write the stored collection while the store holds the key.
    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Comment>) -> Result<()>,
    {
        self.store.update(&self.key, |current| {
            let mut comments: Vec<Comment> = match current {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            };
            f(&mut comments)?;
            Ok(Some(serde_json::to_string(&comments)?))
        })
    }

    fn replace(&self, comments: &[Comment]) -> Result<()> {
        let json = serde_json::to_string(comments)?;
        self.store.update(&self.key, |_| Ok(Some(json)))
    }

    fn remove_all(&self) -> Result<()> {
        self.store.update(&self.key, |_| Ok(None))
    }
}

#[async_trait]
impl<S: KeyValueStore> StorageAdapter for LocalStorageAdapter<S> {
    async fn get_comments(&self) -> Result<Vec<Comment>> {
        self.read()
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        self.replace(comments)
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.modify(|comments| {
            comments.push(comment.clone());
            Ok(())
        })
    }

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()> {
        self.modify(|comments| {
            let comment = comments
                .iter_mut()
                .find(|c| c.id == *id)
                .ok_or_else(|| Error::CommentNotFound {
                    comment_id: id.clone(),
                })?;
            patch.apply_to(comment);
            Ok(())
        })
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<()> {
        self.modify(|comments| {
            let before = comments.len();
            comments.retain(|c| c.id != *id);
            if comments.len() == before {
                log::warn!("delete of unknown comment {} ignored", id);
            }
            Ok(())
        })
    }

    async fn clear_all_storage(&self) -> Result<()> {
        self.remove_all()
    }
}
