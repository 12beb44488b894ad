use std::collections::HashMap;

use comment_types::{Comment, CommentId, CommentThread};

/// Group comments into flat threads (root + direct replies).
///
/// Roots are filtered by `source_id`/`source_type` when given and ordered by
/// creation time. Replies whose root is missing are dropped.
pub fn assemble_threads(
    comments: Vec<Comment>,
    source_id: Option<&str>,
    source_type: Option<&str>,
) -> Vec<CommentThread> {
    let mut roots = Vec::new();
    let mut replies: HashMap<CommentId, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match &comment.parent_id {
            Some(parent_id) => replies.entry(parent_id.clone()).or_default().push(comment),
            None => {
                let source_matches = source_id.is_none_or(|id| comment.source_id.as_deref() == Some(id));
                let type_matches =
                    source_type.is_none_or(|t| comment.source_type.as_deref() == Some(t));
                if source_matches && type_matches {
                    roots.push(comment);
                }
            }
        }
    }

    roots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    roots
        .into_iter()
        .map(|root| {
            let thread_replies = replies.remove(&root.id).unwrap_or_default();
            CommentThread::new(root, thread_replies)
        })
        .collect()
}
