//! Comment orchestration: reducer-owned state, lifecycle events, typed hook
//! pipelines and the [`CommentProvider`] that ties them to one storage adapter.

mod actions;
mod config;
mod events;
mod hooks;
mod provider;
mod reducer;
mod threading;

use std::path::PathBuf;

use comment_types::CommentId;

pub use actions::{CommentActions, LogNotifier, Notifier, ReplyContext};
pub use config::{CommentConfig, DeleteMode, EditorFeatures, QueryCacheConfig, StorageConfig};
pub use events::{CommentEvent, CommentEvents, ErrorAction, EventKind, Subscription};
pub use hooks::{
    BoxFuture, CommentDraft, DraftPatch, HookContext, HookData, HookName, HookPoint,
    HookRegistration, HookRegistry,
};
pub use provider::{CommentProvider, CommentProviderBuilder, CommentTarget};
pub use reducer::{CommentAction, CommentState, reduce};
pub use threading::find_root_parent;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Store(#[from] comment_store::Error),
    #[error("Hook {point} failed: {message}")]
    Hook { point: &'static str, message: String },
    #[error("User must be logged in")]
    NotLoggedIn,
    #[error("Comment not found: {comment_id}")]
    CommentNotFound { comment_id: CommentId },
    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
