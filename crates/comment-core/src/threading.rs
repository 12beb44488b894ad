use std::collections::HashSet;

use comment_types::{Comment, CommentId};

/// Walk the `parent_id` chain of `comment_id` up to its thread root.
///
/// Returns `comment_id` itself when it is unknown or already a root. When the
/// chain points at a comment missing from `comments`, that missing id is
/// returned. A cyclic chain stops at the first repeated id.
pub fn find_root_parent(comment_id: &CommentId, comments: &[Comment]) -> CommentId {
    let mut current = comment_id.clone();
    let mut seen = HashSet::new();
    while seen.insert(current.clone()) {
        let parent = comments
            .iter()
            .find(|c| c.id == current)
            .and_then(|c| c.parent_id.clone());
        match parent {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}
