//! Typed middleware chains run around comment persistence.
//!
//! Each hook point carries one data type: drafts for the `before*` points of
//! add/update, stored comments for the rest. Callbacks run sequentially in
//! registration order; a callback may return a patch that is merged into the
//! data before the next one runs. The first failing callback aborts the chain.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use comment_types::{Comment, CommentId, CommentPatch, MentionRef, User};

use crate::{CommentConfig, Error, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeAddComment,
    AfterAddComment,
    BeforeUpdateComment,
    AfterUpdateComment,
    BeforeSaveComment,
    AfterSaveComment,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeAddComment => "beforeAddComment",
            HookPoint::AfterAddComment => "afterAddComment",
            HookPoint::BeforeUpdateComment => "beforeUpdateComment",
            HookPoint::AfterUpdateComment => "afterUpdateComment",
            HookPoint::BeforeSaveComment => "beforeSaveComment",
            HookPoint::AfterSaveComment => "afterSaveComment",
        }
    }
}

/// A hook point together with the data type its callbacks receive.
pub struct HookName<T> {
    point: HookPoint,
    _data: PhantomData<fn() -> T>,
}

impl<T> Clone for HookName<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HookName<T> {}

impl<T> HookName<T> {
    const fn new(point: HookPoint) -> Self {
        Self {
            point,
            _data: PhantomData,
        }
    }

    pub fn point(&self) -> HookPoint {
        self.point
    }
}

impl HookName<CommentDraft> {
    pub const BEFORE_ADD_COMMENT: Self = Self::new(HookPoint::BeforeAddComment);
    pub const BEFORE_UPDATE_COMMENT: Self = Self::new(HookPoint::BeforeUpdateComment);
}

impl HookName<Comment> {
    pub const AFTER_ADD_COMMENT: Self = Self::new(HookPoint::AfterAddComment);
    pub const AFTER_UPDATE_COMMENT: Self = Self::new(HookPoint::AfterUpdateComment);
    pub const BEFORE_SAVE_COMMENT: Self = Self::new(HookPoint::BeforeSaveComment);
    pub const AFTER_SAVE_COMMENT: Self = Self::new(HookPoint::AfterSaveComment);
}

/// Comment body and placement as it travels through the `before*` hooks of
/// add and update. Placement fields are ignored on update.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentDraft {
    /// Set when the draft edits an existing comment.
    pub comment_id: Option<CommentId>,
    pub content: String,
    pub editor_state: String,
    pub mentions: Vec<MentionRef>,
    pub tags: Vec<MentionRef>,
    pub source_id: Option<String>,
    pub source_type: Option<String>,
    pub parent_id: Option<CommentId>,
}

/// Fields a hook replaces in a [`CommentDraft`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPatch {
    pub content: Option<String>,
    pub editor_state: Option<String>,
    pub mentions: Option<Vec<MentionRef>>,
    pub tags: Option<Vec<MentionRef>>,
    pub source_id: Option<String>,
    pub source_type: Option<String>,
}

/// Read-only view handed to every hook callback.
#[derive(Clone)]
pub struct HookContext {
    pub current_user: Option<User>,
    pub config: Arc<CommentConfig>,
    pub existing_comments: Arc<[Comment]>,
}

mod private {
    use std::collections::HashMap;
    use std::sync::Arc;

    use comment_types::Comment;

    use super::{BoxFuture, CommentDraft, HookContext, HookData, HookPoint};

    pub type Callback<T> = Arc<
        dyn Fn(T, HookContext) -> BoxFuture<anyhow::Result<Option<<T as HookData>::Patch>>>
            + Send
            + Sync,
    >;

    pub struct Registered<T: HookData> {
        pub id: u64,
        pub callback: Callback<T>,
    }

    pub trait Sealed {}

    impl Sealed for CommentDraft {}
    impl Sealed for Comment {}

    #[derive(Default)]
    pub struct Tables {
        pub drafts: HashMap<HookPoint, Vec<Registered<CommentDraft>>>,
        pub comments: HashMap<HookPoint, Vec<Registered<Comment>>>,
    }
}

use private::{Callback, Registered, Tables};

/// Data carried through a hook chain.
pub trait HookData: private::Sealed + Clone + Send + Sync + Sized + 'static {
    type Patch: Send + 'static;

    fn merge(&mut self, patch: Self::Patch);

    #[doc(hidden)]
    fn table(tables: &mut Tables) -> &mut HashMap<HookPoint, Vec<Registered<Self>>>;
}

impl HookData for CommentDraft {
    type Patch = DraftPatch;

    fn merge(&mut self, patch: DraftPatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(editor_state) = patch.editor_state {
            self.editor_state = editor_state;
        }
        if let Some(mentions) = patch.mentions {
            self.mentions = mentions;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(source_id) = patch.source_id {
            self.source_id = Some(source_id);
        }
        if let Some(source_type) = patch.source_type {
            self.source_type = Some(source_type);
        }
    }

    fn table(tables: &mut Tables) -> &mut HashMap<HookPoint, Vec<Registered<Self>>> {
        &mut tables.drafts
    }
}

impl HookData for Comment {
    type Patch = CommentPatch;

    fn merge(&mut self, patch: CommentPatch) {
        patch.apply_to(self);
    }

    fn table(tables: &mut Tables) -> &mut HashMap<HookPoint, Vec<Registered<Self>>> {
        &mut tables.comments
    }
}

struct Inner {
    next_id: AtomicU64,
    tables: Mutex<Tables>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of hook callbacks for one provider. Clones share the same registry.
#[derive(Clone)]
pub struct HookRegistry {
    inner: Arc<Inner>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                tables: Mutex::new(Tables::default()),
            }),
        }
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, F, Fut>(&self, name: HookName<T>, callback: F) -> HookRegistration
    where
        T: HookData,
        F: Fn(T, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<T::Patch>>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(
            move |data: T, context: HookContext| -> BoxFuture<anyhow::Result<Option<T::Patch>>> {
                Box::pin(callback(data, context))
            },
        );
        T::table(&mut self.inner.lock())
            .entry(name.point)
            .or_default()
            .push(Registered { id, callback });

        let inner = Arc::downgrade(&self.inner);
        let point = name.point;
        HookRegistration {
            unregister: Box::new(move || {
                let Some(inner) = inner.upgrade() else {
                    return false;
                };
                let mut tables = inner.lock();
                let Some(entries) = T::table(&mut tables).get_mut(&point) else {
                    return false;
                };
                let before = entries.len();
                entries.retain(|r| r.id != id);
                entries.len() < before
            }),
        }
    }

    /// Run every callback registered for `name` over `data`, in order.
    ///
    /// Returns `data` unchanged when nothing is registered.
    pub async fn execute<T: HookData>(
        &self,
        name: HookName<T>,
        data: T,
        context: &HookContext,
    ) -> Result<T> {
        let callbacks: Vec<Callback<T>> = T::table(&mut self.inner.lock())
            .get(&name.point)
            .map(|entries| entries.iter().map(|r| r.callback.clone()).collect())
            .unwrap_or_default();

        let mut data = data;
        for callback in callbacks {
            match callback(data.clone(), context.clone()).await {
                Ok(Some(patch)) => data.merge(patch),
                Ok(None) => {}
                Err(err) => {
                    log::error!("hook {} failed: {:#}", name.point.as_str(), err);
                    return Err(Error::Hook {
                        point: name.point.as_str(),
                        message: format!("{:#}", err),
                    });
                }
            }
        }
        Ok(data)
    }

    pub fn count(&self, point: HookPoint) -> usize {
        let tables = self.inner.lock();
        tables.drafts.get(&point).map_or(0, Vec::len)
            + tables.comments.get(&point).map_or(0, Vec::len)
    }

    /// Remove every registered callback.
    pub fn clear(&self) {
        let mut tables = self.inner.lock();
        tables.drafts.clear();
        tables.comments.clear();
    }
}

/// Handle returned by [`HookRegistry::register`].
pub struct HookRegistration {
    unregister: Box<dyn FnOnce() -> bool + Send>,
}

impl HookRegistration {
    /// Remove the callback. Returns `false` when it was already gone.
    pub fn unregister(self) -> bool {
        (self.unregister)()
    }
}

#[cfg(test)]
mod tests {
    use comment_types::{NewComment, User};

    use super::*;

    fn context() -> HookContext {
        HookContext {
            current_user: Some(User::new("u1", "Ann")),
            config: Arc::new(CommentConfig::default()),
            existing_comments: Arc::from(Vec::new()),
        }
    }

    fn draft(content: &str) -> CommentDraft {
        CommentDraft {
            comment_id: None,
            content: content.to_string(),
            editor_state: "{}".to_string(),
            mentions: Vec::new(),
            tags: Vec::new(),
            source_id: None,
            source_type: None,
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn test_no_hooks_returns_data_unchanged() {
        let registry = HookRegistry::new();
        let out = registry
            .execute(HookName::BEFORE_ADD_COMMENT, draft("hi"), &context())
            .await
            .unwrap();
        assert_eq!(out, draft("hi"));
    }

    #[tokio::test]
    async fn test_hooks_chain_in_registration_order() {
        let registry = HookRegistry::new();
        registry.register(HookName::BEFORE_ADD_COMMENT, |data: CommentDraft, _| async move {
            Ok(Some(DraftPatch {
                content: Some(format!("{} [a]", data.content)),
                ..DraftPatch::default()
            }))
        });
        registry.register(HookName::BEFORE_ADD_COMMENT, |data: CommentDraft, _| async move {
            assert!(data.content.ends_with("[a]"));
            Ok(Some(DraftPatch {
                content: Some(format!("{} [b]", data.content)),
                source_id: Some("doc1".into()),
                ..DraftPatch::default()
            }))
        });

        let out = registry
            .execute(HookName::BEFORE_ADD_COMMENT, draft("hi"), &context())
            .await
            .unwrap();
        assert_eq!(out.content, "hi [a] [b]");
        assert_eq!(out.source_id.as_deref(), Some("doc1"));
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_chain() {
        let registry = HookRegistry::new();
        let reached: Arc<Mutex<bool>> = Arc::default();
        registry.register(HookName::BEFORE_UPDATE_COMMENT, |_: CommentDraft, _| async {
            Err(anyhow::anyhow!("profanity detected"))
        });
        let flag = reached.clone();
        registry.register(HookName::BEFORE_UPDATE_COMMENT, move |_: CommentDraft, _| {
            let flag = flag.clone();
            async move {
                *flag.lock().unwrap() = true;
                Ok(None)
            }
        });

        let err = registry
            .execute(HookName::BEFORE_UPDATE_COMMENT, draft("hi"), &context())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Hook {
                point: "beforeUpdateComment",
                ..
            }
        ));
        assert!(err.to_string().contains("profanity detected"));
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn test_comment_hooks_merge_comment_patches() {
        let registry = HookRegistry::new();
        registry.register(HookName::BEFORE_SAVE_COMMENT, |_: Comment, context: HookContext| async move {
            assert_eq!(context.current_user.map(|u| u.id).as_deref(), Some("u1"));
            Ok(Some(CommentPatch {
                content: Some("moderated".into()),
                ..CommentPatch::default()
            }))
        });
        let comment = NewComment::new("raw", "{}", User::new("u1", "Ann")).into_comment();

        let out = registry
            .execute(HookName::BEFORE_SAVE_COMMENT, comment.clone(), &context())
            .await
            .unwrap();
        assert_eq!(out.content, "moderated");
        assert_eq!(out.id, comment.id);

        let untouched = registry
            .execute(HookName::AFTER_SAVE_COMMENT, comment.clone(), &context())
            .await
            .unwrap();
        assert_eq!(untouched, comment);
    }

    #[tokio::test]
    async fn test_unregister_and_clear() {
        let registry = HookRegistry::new();
        let first = registry.register(HookName::AFTER_ADD_COMMENT, |_: Comment, _| async { Ok(None) });
        registry.register(HookName::AFTER_ADD_COMMENT, |_: Comment, _| async { Ok(None) });
        registry.register(HookName::BEFORE_ADD_COMMENT, |_: CommentDraft, _| async { Ok(None) });
        assert_eq!(registry.count(HookPoint::AfterAddComment), 2);

        assert!(first.unregister());
        assert_eq!(registry.count(HookPoint::AfterAddComment), 1);

        let late = registry.register(HookName::AFTER_SAVE_COMMENT, |_: Comment, _| async { Ok(None) });
        registry.clear();
        assert_eq!(registry.count(HookPoint::AfterAddComment), 0);
        assert_eq!(registry.count(HookPoint::BeforeAddComment), 0);
        assert!(!late.unregister());
    }
}
