use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use comment_store::StorageAdapter;
use comment_types::{
    Comment, CommentId, CommentPatch, CommentReaction, CommentThread, EditorUpdate,
    MentionDirectory, NewComment, ReactionId, User, extract_mentions_and_tags,
};

use crate::events::{CommentEvent, CommentEvents, ErrorAction};
use crate::hooks::{CommentDraft, HookContext, HookName, HookRegistry};
use crate::reducer::{CommentAction, CommentState, reduce};
use crate::threading::find_root_parent;
use crate::{CommentConfig, DeleteMode, Error, Result};

/// Verbose diagnostics, emitted only when `config.debug` is set.
macro_rules! trace {
    ($provider:expr, $($arg:tt)+) => {
        if $provider.config.debug {
            log::debug!($($arg)+);
        }
    };
}

/// Where a new comment is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentTarget {
    pub source_id: Option<String>,
    pub source_type: Option<String>,
    pub parent_id: Option<CommentId>,
}

impl CommentTarget {
    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Self::default()
        }
    }

    /// A reply to `parent_id`, placed on the parent's source.
    pub fn reply_to(parent_id: impl Into<CommentId>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<CommentId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

pub struct CommentProviderBuilder {
    adapter: Arc<dyn StorageAdapter>,
    current_user: Option<User>,
    config: CommentConfig,
    initial_comments: Option<Vec<Comment>>,
    mentions: MentionDirectory,
}

impl CommentProviderBuilder {
    pub fn current_user(mut self, user: User) -> Self {
        self.current_user = Some(user);
        self
    }

    pub fn config(mut self, config: CommentConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from these comments; the adapter is then never asked for the initial set.
    pub fn initial_comments(mut self, comments: Vec<Comment>) -> Self {
        self.initial_comments = Some(comments);
        self
    }

    pub fn mentions(mut self, mentions: MentionDirectory) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn build(self) -> CommentProvider {
        let preloaded = self.initial_comments.is_some();
        let state = CommentState {
            comments: self.initial_comments.unwrap_or_default(),
            ..CommentState::default()
        };
        CommentProvider {
            adapter: self.adapter,
            config: Arc::new(self.config),
            mentions: self.mentions,
            current_user: RwLock::new(self.current_user),
            state: RwLock::new(state),
            hooks: HookRegistry::new(),
            events: CommentEvents::new(),
            preloaded,
        }
    }
}

/// Owner of the in-memory comment state for one widget instance.
///
/// Every mutation goes through the storage adapter and the hook chains, then
/// through [`reduce`], and is announced on [`events`](Self::events) after the
/// state has changed. Failures never escape: they are recorded in
/// `state().error` and emitted as [`CommentEvent::Error`].
pub struct CommentProvider {
    adapter: Arc<dyn StorageAdapter>,
    config: Arc<CommentConfig>,
    mentions: MentionDirectory,
    current_user: RwLock<Option<User>>,
    state: RwLock<CommentState>,
    hooks: HookRegistry,
    events: CommentEvents,
    preloaded: bool,
}

impl CommentProvider {
    pub fn builder(adapter: Arc<dyn StorageAdapter>) -> CommentProviderBuilder {
        CommentProviderBuilder {
            adapter,
            current_user: None,
            config: CommentConfig::default(),
            initial_comments: None,
            mentions: MentionDirectory::default(),
        }
    }

    /// Load the initial comment set unless the provider was built with one.
    pub async fn initialize(&self) {
        if self.preloaded {
            trace!(
                self,
                "using {} preloaded comments",
                self.state_read().comments.len()
            );
            return;
        }
        self.refresh_data().await;
    }

    /// Drop every listener and hook registered on this instance.
    pub fn unmount(&self) {
        self.events.clear();
        self.hooks.clear();
        trace!(self, "comment provider unmounted");
    }

    pub fn state(&self) -> CommentState {
        self.state_read().clone()
    }

    pub fn config(&self) -> &CommentConfig {
        &self.config
    }

    pub fn mentions(&self) -> &MentionDirectory {
        &self.mentions
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn events(&self) -> &CommentEvents {
        &self.events
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_current_user(&self, user: Option<User>) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user;
    }

    pub async fn add_comment(
        &self,
        content: impl Into<String>,
        editor_state: impl Into<String>,
        target: CommentTarget,
    ) -> Option<Comment> {
        match self
            .try_add_comment(content.into(), editor_state.into(), target)
            .await
        {
            Ok(comment) => Some(comment),
            Err(err) => {
                self.fail(ErrorAction::Add, &err);
                None
            }
        }
    }

    /// Replace the body of comment `id`. An empty `editor_state` is ignored.
    pub async fn update_comment(
        &self,
        id: &CommentId,
        content: impl Into<String>,
        editor_state: impl Into<String>,
    ) -> Option<Comment> {
        let editor_state = editor_state.into();
        if editor_state.trim().is_empty() {
            log::warn!("update of comment {} skipped: no editor state", id);
            return None;
        }
        match self
            .try_update_comment(id, content.into(), editor_state)
            .await
        {
            Ok(comment) => Some(comment),
            Err(err) => {
                self.fail(ErrorAction::Update, &err);
                None
            }
        }
    }

    pub async fn delete_comment(&self, id: &CommentId) -> bool {
        match self.try_delete_comment(id).await {
            Ok(()) => true,
            Err(err) => {
                self.fail(ErrorAction::Delete, &err);
                false
            }
        }
    }

    /// Toggle the current user's `reaction_type` reaction on a comment.
    pub async fn add_reaction(&self, comment_id: &CommentId, reaction_type: &str) -> bool {
        match self.try_toggle_reaction(comment_id, reaction_type).await {
            Ok(()) => true,
            Err(err) => {
                self.fail(ErrorAction::Reaction, &err);
                false
            }
        }
    }

    pub async fn remove_reaction(&self, comment_id: &CommentId, reaction_id: &ReactionId) -> bool {
        match self.try_remove_reaction(comment_id, reaction_id).await {
            Ok(()) => true,
            Err(err) => {
                self.fail(ErrorAction::Reaction, &err);
                false
            }
        }
    }

    pub async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Vec<CommentThread> {
        match self.adapter.get_comment_threads(source_id, source_type).await {
            Ok(threads) => threads,
            Err(err) => {
                self.fail(ErrorAction::Threads, &err.into());
                Vec::new()
            }
        }
    }

    pub fn get_comments_by_source(&self, source_id: &str, source_type: Option<&str>) -> Vec<Comment> {
        self.state_read()
            .visible()
            .filter(|c| c.matches_source(source_id, source_type))
            .cloned()
            .collect()
    }

    /// Direct replies of `parent_id`, oldest first.
    pub fn get_replies_for_comment(&self, parent_id: &CommentId) -> Vec<Comment> {
        let mut replies: Vec<Comment> = self
            .state_read()
            .visible()
            .filter(|c| c.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        replies
    }

    /// Reload the full comment set from the adapter.
    pub async fn refresh_data(&self) -> bool {
        self.dispatch(CommentAction::SetLoading(true));
        match self.adapter.get_comments().await {
            Ok(comments) => {
                trace!(self, "loaded {} comments", comments.len());
                self.dispatch(CommentAction::LoadComments(comments.clone()));
                self.dispatch(CommentAction::SetLoading(false));
                self.events.emit(&CommentEvent::Loaded { comments });
                true
            }
            Err(err) => {
                self.fail(ErrorAction::Load, &err.into());
                false
            }
        }
    }

    /// Wipe adapter storage and empty the in-memory state.
    pub async fn clear_all_storage(&self) -> bool {
        match self.try_clear_all_storage().await {
            Ok(()) => true,
            Err(err) => {
                self.fail(ErrorAction::Clear, &err);
                false
            }
        }
    }

    async fn try_add_comment(
        &self,
        content: String,
        editor_state: String,
        target: CommentTarget,
    ) -> Result<Comment> {
        let user = self.require_user()?;
        let refs = extract_mentions_and_tags(&editor_state);
        let target = self.resolve_target(target);
        let context = self.hook_context(Some(user.clone()));

        let draft = CommentDraft {
            comment_id: None,
            content,
            editor_state,
            mentions: refs.mentions,
            tags: refs.tags,
            source_id: target.source_id,
            source_type: target.source_type,
            parent_id: target.parent_id,
        };
        let draft = self
            .hooks
            .execute(HookName::BEFORE_ADD_COMMENT, draft, &context)
            .await?;

        trace!(
            self,
            "adding comment by {} (parent: {:?})",
            user.id,
            draft.parent_id
        );
        let stored = self
            .adapter
            .add_lexical_comment(NewComment {
                content: draft.content,
                editor_state: draft.editor_state,
                author: user,
                mentions: draft.mentions,
                tags: draft.tags,
                source_id: draft.source_id,
                source_type: draft.source_type,
                parent_id: draft.parent_id,
            })
            .await?;

        let saved = self
            .hooks
            .execute(HookName::BEFORE_SAVE_COMMENT, stored, &context)
            .await?;
        self.hooks
            .execute(HookName::AFTER_ADD_COMMENT, saved.clone(), &context)
            .await?;
        self.hooks
            .execute(HookName::AFTER_SAVE_COMMENT, saved.clone(), &context)
            .await?;

        self.dispatch(CommentAction::AddComment(saved.clone()));
        self.events.emit(&CommentEvent::Added {
            comment: saved.clone(),
        });
        Ok(saved)
    }

    async fn try_update_comment(
        &self,
        id: &CommentId,
        content: String,
        editor_state: String,
    ) -> Result<Comment> {
        let user = self.require_user()?;
        let existing = self
            .state_read()
            .find(id)
            .cloned()
            .ok_or_else(|| Error::CommentNotFound {
                comment_id: id.clone(),
            })?;
        let refs = extract_mentions_and_tags(&editor_state);
        let context = self.hook_context(Some(user));

        let draft = CommentDraft {
            comment_id: Some(id.clone()),
            content,
            editor_state,
            mentions: refs.mentions,
            tags: refs.tags,
            source_id: existing.source_id.clone(),
            source_type: existing.source_type.clone(),
            parent_id: existing.parent_id.clone(),
        };
        let draft = self
            .hooks
            .execute(HookName::BEFORE_UPDATE_COMMENT, draft, &context)
            .await?;

        let update = EditorUpdate::new(draft.content, draft.editor_state)
            .with_refs(draft.mentions, draft.tags);
        let patch = update.clone().into_patch();
        trace!(self, "updating comment {}", id);
        self.adapter
            .update_comment_with_editor_state(id, update)
            .await?;

        let mut updated = existing.clone();
        patch.apply_to(&mut updated);
        let saved = self
            .hooks
            .execute(HookName::BEFORE_SAVE_COMMENT, updated, &context)
            .await?;
        self.hooks
            .execute(HookName::AFTER_UPDATE_COMMENT, saved.clone(), &context)
            .await?;
        self.hooks
            .execute(HookName::AFTER_SAVE_COMMENT, saved.clone(), &context)
            .await?;

        self.dispatch(CommentAction::UpdateComment {
            id: id.clone(),
            patch: CommentPatch::from_comment(&saved),
        });
        self.events.emit(&CommentEvent::Updated {
            comment: saved.clone(),
            previous_content: existing.content,
        });
        Ok(saved)
    }

    async fn try_delete_comment(&self, id: &CommentId) -> Result<()> {
        self.require_user()?;
        match self.config.delete_mode {
            DeleteMode::Optimistic => {
                self.dispatch(CommentAction::DeleteComment(id.clone()));
                self.adapter.delete_comment(id).await?;
            }
            DeleteMode::Confirmed => {
                self.dispatch(CommentAction::MarkPendingDelete(id.clone()));
                if let Err(err) = self.adapter.delete_comment(id).await {
                    self.dispatch(CommentAction::RestoreComment(id.clone()));
                    return Err(err.into());
                }
                self.dispatch(CommentAction::DeleteComment(id.clone()));
            }
        }
        trace!(self, "deleted comment {}", id);
        self.events.emit(&CommentEvent::Deleted {
            comment_id: id.clone(),
        });
        Ok(())
    }

    async fn try_toggle_reaction(&self, comment_id: &CommentId, reaction_type: &str) -> Result<()> {
        let user = self.require_user()?;
        let existing = {
            let state = self.state_read();
            let comment = state.find(comment_id).ok_or_else(|| Error::CommentNotFound {
                comment_id: comment_id.clone(),
            })?;
            comment
                .reaction_by(&user.id, reaction_type)
                .map(|r| r.id.clone())
        };

        let event = match existing {
            Some(reaction_id) => {
                self.dispatch(CommentAction::RemoveReaction {
                    comment_id: comment_id.clone(),
                    reaction_id: reaction_id.clone(),
                });
                CommentEvent::ReactionRemoved {
                    comment_id: comment_id.clone(),
                    reaction_id,
                }
            }
            None => {
                let reaction = CommentReaction::new(user.id.clone(), reaction_type);
                self.dispatch(CommentAction::AddReaction {
                    comment_id: comment_id.clone(),
                    reaction: reaction.clone(),
                });
                CommentEvent::ReactionAdded {
                    comment_id: comment_id.clone(),
                    reaction,
                }
            }
        };

        self.persist_comments().await?;
        self.events.emit(&event);
        Ok(())
    }

    async fn try_remove_reaction(&self, comment_id: &CommentId, reaction_id: &ReactionId) -> Result<()> {
        self.require_user()?;
        self.dispatch(CommentAction::RemoveReaction {
            comment_id: comment_id.clone(),
            reaction_id: reaction_id.clone(),
        });
        self.persist_comments().await?;
        self.events.emit(&CommentEvent::ReactionRemoved {
            comment_id: comment_id.clone(),
            reaction_id: reaction_id.clone(),
        });
        Ok(())
    }

    async fn try_clear_all_storage(&self) -> Result<()> {
        self.require_user()?;
        self.adapter.clear_all_storage().await?;
        self.dispatch(CommentAction::LoadComments(Vec::new()));
        log::info!("all comment storage cleared");
        self.events.emit(&CommentEvent::Cleared);
        Ok(())
    }

    /// Reactions are written back as the whole collection.
    async fn persist_comments(&self) -> Result<()> {
        let comments = self.state_read().comments.clone();
        self.adapter.save_comments(&comments).await?;
        Ok(())
    }

    /// Point replies at their thread root and inherit the parent's source
    /// when no source was given.
    fn resolve_target(&self, target: CommentTarget) -> CommentTarget {
        let Some(parent_id) = target.parent_id.clone() else {
            return target;
        };
        let state = self.state_read();
        let Some(parent) = state.find(&parent_id) else {
            return target;
        };

        let root_id = find_root_parent(&parent_id, &state.comments);
        if root_id != parent_id {
            trace!(self, "re-parenting reply from {} to root {}", parent_id, root_id);
        }
        let (source_id, source_type) = match target.source_id {
            Some(source_id) => (Some(source_id), target.source_type),
            None => (parent.source_id.clone(), parent.source_type.clone()),
        };
        CommentTarget {
            source_id,
            source_type,
            parent_id: Some(root_id),
        }
    }

    fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(Error::NotLoggedIn)
    }

    fn hook_context(&self, current_user: Option<User>) -> HookContext {
        HookContext {
            current_user,
            config: self.config.clone(),
            existing_comments: self.state_read().comments.clone().into(),
        }
    }

    fn state_read(&self) -> RwLockReadGuard<'_, CommentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The only writer of `state`.
    fn dispatch(&self, action: CommentAction) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = reduce(&state, action);
    }

    fn fail(&self, action: ErrorAction, err: &Error) {
        let message = match err {
            Error::NotLoggedIn => err.to_string(),
            _ => action.failure_message().to_string(),
        };
        log::error!("comment {} failed: {}", action, err);
        self.dispatch(CommentAction::SetError(message.clone()));
        self.events.emit(&CommentEvent::Error {
            error: message,
            action,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use test_store::{ScriptedAdapter, alice, comment_at, editor_state};

    use super::*;
    use crate::EventKind;

    fn provider(adapter: Arc<ScriptedAdapter>) -> CommentProvider {
        CommentProvider::builder(adapter).current_user(alice()).build()
    }

    #[tokio::test]
    async fn test_initial_comments_skip_the_adapter() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let provider = CommentProvider::builder(adapter.clone())
            .initial_comments(vec![comment_at("c1", None, alice(), 0)])
            .build();

        provider.initialize().await;
        assert_eq!(adapter.calls(test_store::Op::GetComments), 0);
        assert_eq!(provider.state().comments.len(), 1);
        assert!(!provider.state().loading);
    }

    #[tokio::test]
    async fn test_initialize_loads_from_adapter() {
        let adapter =
            Arc::new(ScriptedAdapter::with_comments(&[comment_at("c1", None, alice(), 0)]).unwrap());
        let provider = provider(adapter.clone());
        let loaded: Arc<Mutex<usize>> = Arc::default();
        let sink = loaded.clone();
        provider.events().on(EventKind::Loaded, move |event| {
            if let CommentEvent::Loaded { comments } = event {
                *sink.lock().unwrap() = comments.len();
            }
        });

        provider.initialize().await;
        assert_eq!(adapter.calls(test_store::Op::GetComments), 1);
        assert_eq!(provider.state().comments.len(), 1);
        assert!(!provider.state().loading);
        assert_eq!(*loaded.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolve_target_inherits_parent_source() {
        let mut root = comment_at("r1", None, alice(), 0);
        root.source_id = Some("doc1".into());
        root.source_type = Some("demo".into());
        let mut reply = comment_at("r2", Some("r1"), alice(), 1);
        reply.source_id = root.source_id.clone();
        let provider = CommentProvider::builder(Arc::new(ScriptedAdapter::new()))
            .initial_comments(vec![root, reply])
            .build();

        let target = provider.resolve_target(CommentTarget::reply_to("r2"));
        assert_eq!(target.parent_id, Some(CommentId::from("r1")));
        assert_eq!(target.source_id.as_deref(), Some("doc1"));
        assert_eq!(target.source_type, None);

        let explicit = provider.resolve_target(CommentTarget::source("doc9").with_parent("r2"));
        assert_eq!(explicit.parent_id, Some(CommentId::from("r1")));
        assert_eq!(explicit.source_id.as_deref(), Some("doc9"));

        let unknown = provider.resolve_target(CommentTarget::reply_to("zz"));
        assert_eq!(unknown, CommentTarget::reply_to("zz"));
    }

    #[tokio::test]
    async fn test_update_with_empty_editor_state_is_ignored() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let provider = provider(adapter.clone());
        let id = CommentId::from("c1");

        assert!(provider.update_comment(&id, "x", "  ").await.is_none());
        assert_eq!(provider.state().error, None);
        assert_eq!(adapter.calls(test_store::Op::UpdateWithEditorState), 0);
    }

    #[tokio::test]
    async fn test_update_of_unknown_comment_fails_before_adapter() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let provider = provider(adapter.clone());

        let result = provider
            .update_comment(&CommentId::from("missing"), "x", editor_state("x"))
            .await;
        assert!(result.is_none());
        assert_eq!(
            provider.state().error.as_deref(),
            Some("Failed to update comment")
        );
        assert_eq!(adapter.calls(test_store::Op::UpdateWithEditorState), 0);
    }

    #[tokio::test]
    async fn test_logged_out_user_is_rejected_without_adapter_call() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let provider = CommentProvider::builder(adapter.clone()).build();

        assert!(provider
            .add_comment("hi", editor_state("hi"), CommentTarget::default())
            .await
            .is_none());
        assert_eq!(
            provider.state().error.as_deref(),
            Some("User must be logged in")
        );
        assert_eq!(adapter.calls(test_store::Op::AddLexicalComment), 0);

        provider.set_current_user(Some(alice()));
        assert!(provider
            .add_comment("hi", editor_state("hi"), CommentTarget::default())
            .await
            .is_some());
    }
}
