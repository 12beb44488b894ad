use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use comment_types::{Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment};

use crate::{Error, Result, StorageAdapter, assemble_threads, insert_new_comment};

/// Boxed future returned by a server action.
pub type ActionFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

type Action0<T> = Arc<dyn Fn() -> ActionFuture<T> + Send + Sync>;
type Action1<A, T> = Arc<dyn Fn(A) -> ActionFuture<T> + Send + Sync>;
type Action2<A, B, T> = Arc<dyn Fn(A, B) -> ActionFuture<T> + Send + Sync>;

/// Caller-supplied server functions, one per adapter operation.
///
/// Any action left unset fails with [`Error::NotImplemented`] when invoked.
/// The derived operations (rich-text add/update, source filter, threads)
/// fall back to composing the primitive actions when not supplied.
#[derive(Clone, Default)]
pub struct ServerActions {
    get_comments: Option<Action0<Vec<Comment>>>,
    save_comments: Option<Action1<Vec<Comment>, ()>>,
    add_comment: Option<Action1<Comment, ()>>,
    update_comment: Option<Action2<CommentId, CommentPatch, ()>>,
    delete_comment: Option<Action1<CommentId, ()>>,
    clear_all_storage: Option<Action0<()>>,
    add_lexical_comment: Option<Action1<NewComment, Comment>>,
    update_comment_with_editor_state: Option<Action2<CommentId, EditorUpdate, ()>>,
    get_comments_by_source: Option<Action2<String, Option<String>, Vec<Comment>>>,
    get_comment_threads: Option<Action2<Option<String>, Option<String>, Vec<CommentThread>>>,
}

macro_rules! action_setter {
    ($setter:ident, $field:ident, ($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        pub fn $setter<F, Fut>(mut self, action: F) -> Self
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<$ret>> + Send + 'static,
        {
            self.$field = Some(Arc::new(move |$($arg: $ty),*| -> ActionFuture<$ret> {
                Box::pin(action($($arg),*))
            }));
            self
        }
    };
}

impl ServerActions {
    pub fn new() -> Self {
        Self::default()
    }

    action_setter!(with_get_comments, get_comments, () -> Vec<Comment>);
    action_setter!(with_save_comments, save_comments, (comments: Vec<Comment>) -> ());
    action_setter!(with_add_comment, add_comment, (comment: Comment) -> ());
    action_setter!(with_update_comment, update_comment, (id: CommentId, patch: CommentPatch) -> ());
    action_setter!(with_delete_comment, delete_comment, (id: CommentId) -> ());
    action_setter!(with_clear_all_storage, clear_all_storage, () -> ());
    action_setter!(with_add_lexical_comment, add_lexical_comment, (new: NewComment) -> Comment);
    action_setter!(
        with_update_comment_with_editor_state,
        update_comment_with_editor_state,
        (id: CommentId, update: EditorUpdate) -> ()
    );
    action_setter!(
        with_get_comments_by_source,
        get_comments_by_source,
        (source_id: String, source_type: Option<String>) -> Vec<Comment>
    );
    action_setter!(
        with_get_comment_threads,
        get_comment_threads,
        (source_id: Option<String>, source_type: Option<String>) -> Vec<CommentThread>
    );
}

fn missing<T>(action: &'static str) -> Result<T> {
    log::error!("server action {} was not supplied", action);
    Err(Error::NotImplemented { action })
}

/// Pass-through adapter over [`ServerActions`].
#[derive(Clone)]
pub struct ServerActionAdapter {
    actions: ServerActions,
}

impl ServerActionAdapter {
    pub fn new(actions: ServerActions) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl StorageAdapter for ServerActionAdapter {
    async fn get_comments(&self) -> Result<Vec<Comment>> {
        match &self.actions.get_comments {
            Some(action) => action().await,
            None => missing("getCommentsAction"),
        }
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        match &self.actions.save_comments {
            Some(action) => action(comments.to_vec()).await,
            None => missing("saveCommentsAction"),
        }
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        match &self.actions.add_comment {
            Some(action) => action(comment.clone()).await,
            None => missing("addCommentAction"),
        }
    }

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()> {
        match &self.actions.update_comment {
            Some(action) => action(id.clone(), patch.clone()).await,
            None => missing("updateCommentAction"),
        }
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<()> {
        match &self.actions.delete_comment {
            Some(action) => action(id.clone()).await,
            None => missing("deleteCommentAction"),
        }
    }

    async fn clear_all_storage(&self) -> Result<()> {
        match &self.actions.clear_all_storage {
            Some(action) => action().await,
            None => missing("clearAllStorageAction"),
        }
    }

    async fn add_lexical_comment(&self, new: NewComment) -> Result<Comment> {
        match &self.actions.add_lexical_comment {
            Some(action) => action(new).await,
            None => insert_new_comment(self, new).await,
        }
    }

    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> Result<()> {
        match &self.actions.update_comment_with_editor_state {
            Some(action) => action(id.clone(), update).await,
            None => self.update_comment(id, &update.into_patch()).await,
        }
    }

    async fn get_comments_by_source(
        &self,
        source_id: &str,
        source_type: Option<&str>,
    ) -> Result<Vec<Comment>> {
        match &self.actions.get_comments_by_source {
            Some(action) => action(source_id.to_string(), source_type.map(String::from)).await,
            None => {
                let comments = self.get_comments().await?;
                Ok(comments
                    .into_iter()
                    .filter(|c| c.matches_source(source_id, source_type))
                    .collect())
            }
        }
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Vec<CommentThread>> {
        match &self.actions.get_comment_threads {
            Some(action) => {
                action(source_id.map(String::from), source_type.map(String::from)).await
            }
            None => {
                let comments = self.get_comments().await?;
                Ok(assemble_threads(comments, source_id, source_type))
            }
        }
    }
}
