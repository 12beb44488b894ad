//! Comment persistence behind a single [`StorageAdapter`] contract.
//!
//! Exactly one adapter backs a provider instance. Transports implement the
//! primitive record operations; the rich-text creation/update paths, source
//! filtering and thread assembly are shared defaults that a transport may
//! override when its backend offers them natively.

mod kv;
mod local;
mod query_cache;
mod request_cache;
mod rest;
mod server_action;
mod store_lock;
mod threads;

use async_trait::async_trait;
use comment_types::{
    Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment,
};

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use local::{LocalStorageAdapter, STORAGE_KEY};
pub use query_cache::{QueryCacheAdapter, QueryKey};
pub use request_cache::{CachedServerActionAdapter, RequestCache};
pub use rest::{RestApiAdapter, RestConfig};
pub use server_action::{ActionFuture, ServerActionAdapter, ServerActions};
pub use threads::assemble_threads;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Server action not implemented: {action}")]
    NotImplemented { action: &'static str },
    #[error("Comment not found: {comment_id}")]
    CommentNotFound { comment_id: CommentId },
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The persistence contract every comment backend fulfils.
///
/// Errors are returned as-is; adapters never retry.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Every comment visible to this adapter's backing store.
    async fn get_comments(&self) -> Result<Vec<Comment>>;

    /// Replace the stored collection wholesale.
    async fn save_comments(&self, comments: &[Comment]) -> Result<()>;

    async fn add_comment(&self, comment: &Comment) -> Result<()>;

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()>;

    async fn delete_comment(&self, id: &CommentId) -> Result<()>;

    /// Irreversibly wipe all comment data held by this adapter.
    async fn clear_all_storage(&self) -> Result<()>;

    /// Canonical creation path: assigns id and timestamps, persists, and
    /// returns the stored record.
    async fn add_lexical_comment(&self, new: NewComment) -> Result<Comment> {
        insert_new_comment(self, new).await
    }

    /// Canonical update path: replaces the body and refs and marks the comment edited.
    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> Result<()> {
        self.update_comment(id, &update.into_patch()).await
    }

    async fn get_comments_by_source(
        &self,
        source_id: &str,
        source_type: Option<&str>,
    ) -> Result<Vec<Comment>> {
        let comments = self.get_comments().await?;
        Ok(comments
            .into_iter()
            .filter(|c| c.matches_source(source_id, source_type))
            .collect())
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Vec<CommentThread>> {
        let comments = self.get_comments().await?;
        Ok(assemble_threads(comments, source_id, source_type))
    }
}

/// Store `new` through the primitive `add_comment` operation.
pub(crate) async fn insert_new_comment<A>(adapter: &A, new: NewComment) -> Result<Comment>
where
    A: StorageAdapter + ?Sized,
{
    let comment = new.into_comment();
    adapter.add_comment(&comment).await?;
    Ok(comment)
}
