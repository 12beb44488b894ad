use comment_types::{Comment, CommentId, CommentPatch, CommentReaction, ReactionId};

/// In-memory comment set owned by one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentState {
    pub comments: Vec<Comment>,
    pub loading: bool,
    pub error: Option<String>,
    /// Comments hidden while a confirmed delete is in flight.
    pub pending_deletes: Vec<CommentId>,
}

impl CommentState {
    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == *id)
    }

    pub fn is_pending_delete(&self, id: &CommentId) -> bool {
        self.pending_deletes.contains(id)
    }

    /// Comments not hidden by a pending delete.
    pub fn visible(&self) -> impl Iterator<Item = &Comment> {
        self.comments
            .iter()
            .filter(|c| !self.is_pending_delete(&c.id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentAction {
    SetLoading(bool),
    LoadComments(Vec<Comment>),
    AddComment(Comment),
    UpdateComment {
        id: CommentId,
        patch: CommentPatch,
    },
    DeleteComment(CommentId),
    AddReaction {
        comment_id: CommentId,
        reaction: CommentReaction,
    },
    RemoveReaction {
        comment_id: CommentId,
        reaction_id: ReactionId,
    },
    SetError(String),
    MarkPendingDelete(CommentId),
    RestoreComment(CommentId),
}

/// Apply `action` to `state`, returning the next state.
///
/// Actions targeting a missing comment leave the state unchanged.
pub fn reduce(state: &CommentState, action: CommentAction) -> CommentState {
    let mut next = state.clone();
    match action {
        CommentAction::SetLoading(loading) => next.loading = loading,
        CommentAction::LoadComments(comments) => {
            next.comments = comments;
            next.error = None;
            next.pending_deletes.clear();
        }
        CommentAction::AddComment(comment) => next.comments.push(comment),
        CommentAction::UpdateComment { id, patch } => {
            if let Some(comment) = next.comments.iter_mut().find(|c| c.id == id) {
                patch.apply_to(comment);
            }
        }
        CommentAction::DeleteComment(id) => {
            next.comments.retain(|c| c.id != id);
            next.pending_deletes.retain(|p| *p != id);
        }
        CommentAction::AddReaction {
            comment_id,
            reaction,
        } => {
            if let Some(comment) = next.comments.iter_mut().find(|c| c.id == comment_id) {
                comment.reactions.push(reaction);
            }
        }
        CommentAction::RemoveReaction {
            comment_id,
            reaction_id,
        } => {
            if let Some(comment) = next.comments.iter_mut().find(|c| c.id == comment_id) {
                comment.reactions.retain(|r| r.id != reaction_id);
            }
        }
        CommentAction::SetError(message) => {
            next.error = Some(message);
            next.loading = false;
        }
        CommentAction::MarkPendingDelete(id) => {
            if next.find(&id).is_some() && !next.is_pending_delete(&id) {
                next.pending_deletes.push(id);
            }
        }
        CommentAction::RestoreComment(id) => next.pending_deletes.retain(|p| *p != id),
    }
    next
}
