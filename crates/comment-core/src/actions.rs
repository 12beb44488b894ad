use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use comment_types::{Comment, CommentId, ReactionId};

use crate::provider::{CommentProvider, CommentTarget};
use crate::threading::find_root_parent;

/// Sink for user-facing success and failure notices.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::warn!("{}", message);
    }
}

/// The comment the composer is currently replying to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub comment_id: CommentId,
    /// Author name at the time the reply was started, for placeholder text.
    pub author_name: String,
}

/// Counts an action as in flight until dropped.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// User-facing operations over a [`CommentProvider`].
///
/// Adds a shared pending flag, success/failure notices (silenced by
/// `hide_toast`) and reply bookkeeping that keeps threads flat.
pub struct CommentActions {
    provider: Arc<CommentProvider>,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicUsize,
    reply: Mutex<Option<ReplyContext>>,
}

impl CommentActions {
    pub fn new(provider: Arc<CommentProvider>) -> Self {
        Self::with_notifier(provider, Arc::new(LogNotifier))
    }

    pub fn with_notifier(provider: Arc<CommentProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            provider,
            notifier,
            in_flight: AtomicUsize::new(0),
            reply: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &CommentProvider {
        &self.provider
    }

    /// True while any action started through this instance is running.
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn reply_slot(&self) -> MutexGuard<'_, Option<ReplyContext>> {
        self.reply.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replying_to(&self) -> Option<ReplyContext> {
        self.reply_slot().clone()
    }

    /// Start replying to `comment_id`. Returns `false` when it is not loaded.
    pub fn start_reply(&self, comment_id: &CommentId) -> bool {
        let Some(comment) = self.provider.state().find(comment_id).cloned() else {
            log::warn!("cannot reply to unknown comment {}", comment_id);
            return false;
        };
        *self.reply_slot() = Some(ReplyContext {
            comment_id: comment.id,
            author_name: comment.author.name,
        });
        true
    }

    pub fn cancel_reply(&self) {
        *self.reply_slot() = None;
    }

    /// Post a comment, or a reply when a reply is in progress.
    ///
    /// Replies are attached to the root of the thread being replied to.
    pub async fn submit_comment(
        &self,
        content: impl Into<String>,
        editor_state: impl Into<String>,
        mut target: CommentTarget,
    ) -> Option<Comment> {
        let _pending = PendingGuard::new(&self.in_flight);
        let replying = self.replying_to();
        if let Some(reply) = &replying {
            let comments = self.provider.state().comments;
            target.parent_id = Some(find_root_parent(&reply.comment_id, &comments));
        }

        let created = self
            .provider
            .add_comment(content, editor_state, target)
            .await;
        match &created {
            Some(_) => {
                if replying.is_some() {
                    self.cancel_reply();
                    self.notify_success("Reply added");
                } else {
                    self.notify_success("Comment added");
                }
            }
            None => self.notify_failure("Failed to add comment"),
        }
        created
    }

    pub async fn edit_comment(
        &self,
        id: &CommentId,
        content: impl Into<String>,
        editor_state: impl Into<String>,
    ) -> Option<Comment> {
        let editor_state = editor_state.into();
        if editor_state.trim().is_empty() {
            log::warn!("edit of comment {} ignored: no editor state", id);
            return None;
        }
        let _pending = PendingGuard::new(&self.in_flight);
        let updated = self.provider.update_comment(id, content, editor_state).await;
        match &updated {
            Some(_) => self.notify_success("Comment updated"),
            None => self.notify_failure("Failed to update comment"),
        }
        updated
    }

    /// Comments with replies stay, so threads never lose their root.
    pub fn can_delete(&self, id: &CommentId) -> bool {
        self.provider.get_replies_for_comment(id).is_empty()
    }

    pub async fn delete_comment(&self, id: &CommentId) -> bool {
        if !self.can_delete(id) {
            self.notify_error("Cannot delete a comment that has replies");
            return false;
        }
        let _pending = PendingGuard::new(&self.in_flight);
        let deleted = self.provider.delete_comment(id).await;
        if deleted {
            let mut reply = self.reply_slot();
            if reply.as_ref().is_some_and(|r| r.comment_id == *id) {
                *reply = None;
            }
            drop(reply);
            self.notify_success("Comment deleted");
        } else {
            self.notify_failure("Failed to delete comment");
        }
        deleted
    }

    pub async fn toggle_reaction(&self, comment_id: &CommentId, reaction_type: &str) -> bool {
        let _pending = PendingGuard::new(&self.in_flight);
        let ok = self.provider.add_reaction(comment_id, reaction_type).await;
        if !ok {
            self.notify_failure("Failed to update reaction");
        }
        ok
    }

    pub async fn remove_reaction(&self, comment_id: &CommentId, reaction_id: &ReactionId) -> bool {
        let _pending = PendingGuard::new(&self.in_flight);
        let ok = self.provider.remove_reaction(comment_id, reaction_id).await;
        if !ok {
            self.notify_failure("Failed to update reaction");
        }
        ok
    }

    pub async fn clear_all(&self) -> bool {
        let _pending = PendingGuard::new(&self.in_flight);
        let cleared = self.provider.clear_all_storage().await;
        if cleared {
            self.cancel_reply();
            self.notify_success("All comments cleared");
        } else {
            self.notify_failure("Failed to clear comments");
        }
        cleared
    }

    fn toasts_enabled(&self) -> bool {
        !self.provider.config().hide_toast
    }

    fn notify_success(&self, message: &str) {
        if self.toasts_enabled() {
            self.notifier.success(message);
        }
    }

    fn notify_error(&self, message: &str) {
        if self.toasts_enabled() {
            self.notifier.error(message);
        }
    }

    /// Prefer the provider's recorded error over the generic `fallback`.
    fn notify_failure(&self, fallback: &str) {
        let message = self
            .provider
            .state()
            .error
            .unwrap_or_else(|| fallback.to_string());
        self.notify_error(&message);
    }
}

#[cfg(test)]
mod tests {
    use test_store::{Op, ScriptedAdapter, alice, bob, comment_at};

    use super::*;
    use crate::CommentConfig;

    #[derive(Default)]
    struct Recorder {
        notices: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn success(&self, message: &str) {
            self.notices.lock().unwrap().push(format!("ok: {}", message));
        }

        fn error(&self, message: &str) {
            self.notices.lock().unwrap().push(format!("err: {}", message));
        }
    }

    fn actions(config: CommentConfig) -> (CommentActions, Arc<Recorder>) {
        let provider = CommentProvider::builder(Arc::new(ScriptedAdapter::new()))
            .current_user(alice())
            .config(config)
            .initial_comments(vec![
                comment_at("r1", None, bob(), 0),
                comment_at("r2", Some("r1"), alice(), 1),
            ])
            .build();
        let recorder = Arc::new(Recorder::default());
        let actions = CommentActions::with_notifier(Arc::new(provider), recorder.clone());
        (actions, recorder)
    }

    #[test]
    fn test_reply_context_snapshots_author() {
        let (actions, _) = actions(CommentConfig::default());
        assert!(actions.start_reply(&"r1".into()));
        assert_eq!(
            actions.replying_to(),
            Some(ReplyContext {
                comment_id: "r1".into(),
                author_name: "Bob".into(),
            })
        );
        assert!(!actions.start_reply(&"nope".into()));
        actions.cancel_reply();
        assert_eq!(actions.replying_to(), None);
    }

    #[test]
    fn test_can_delete_refuses_roots_with_replies() {
        let (actions, _) = actions(CommentConfig::default());
        assert!(!actions.can_delete(&"r1".into()));
        assert!(actions.can_delete(&"r2".into()));
    }

    #[tokio::test]
    async fn test_delete_guard_notifies() {
        let (actions, recorder) = actions(CommentConfig::default());
        assert!(!actions.delete_comment(&"r1".into()).await);
        assert_eq!(actions.provider().state().comments.len(), 2);
        assert_eq!(
            *recorder.notices.lock().unwrap(),
            ["err: Cannot delete a comment that has replies"]
        );
    }

    #[tokio::test]
    async fn test_blank_edit_raises_no_notice() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let provider = CommentProvider::builder(adapter.clone())
            .current_user(alice())
            .initial_comments(vec![comment_at("r1", None, bob(), 0)])
            .build();
        let recorder = Arc::new(Recorder::default());
        let actions = CommentActions::with_notifier(Arc::new(provider), recorder.clone());

        adapter.fail(Op::SaveComments);
        assert!(!actions.toggle_reaction(&"r1".into(), "like").await);
        assert!(actions.provider().state().error.is_some());
        recorder.notices.lock().unwrap().clear();

        assert_eq!(actions.edit_comment(&"r1".into(), "x", "  ").await, None);
        assert!(recorder.notices.lock().unwrap().is_empty());
        assert!(!actions.is_pending());
    }

    #[tokio::test]
    async fn test_hide_toast_silences_notices() {
        let config = CommentConfig {
            hide_toast: true,
            ..CommentConfig::default()
        };
        let (actions, recorder) = actions(config);
        assert!(actions.delete_comment(&"r2".into()).await);
        assert!(recorder.notices.lock().unwrap().is_empty());
        assert!(!actions.is_pending());
    }
}
