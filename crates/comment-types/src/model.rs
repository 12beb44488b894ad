use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::extract_mentions_and_tags;
use crate::{CommentId, MentionRef, ReactionId};

/// The user posting or reacting to a comment.
///
/// Comments keep a snapshot of the author taken at creation time; later
/// changes to the user record are not propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            avatar_url: None,
        }
    }
}

/// Lifecycle tag of a comment. Only `Active` comments are shown as live content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    #[default]
    Active,
    Deleted,
    Hidden,
}

/// A reaction left on a comment. Unique per (user_id, reaction_type) within a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct CommentReaction {
    pub id: ReactionId,
    pub user_id: String,
    #[serde(rename = "type")]
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

impl CommentReaction {
    pub fn new(user_id: impl Into<String>, reaction_type: impl Into<String>) -> Self {
        Self {
            id: ReactionId::generate(),
            user_id: user_id.into(),
            reaction_type: reaction_type.into(),
            created_at: Utc::now(),
        }
    }
}

/// A stored comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    /// Plain-text projection of the rich-text body.
    pub content: String,
    /// Serialized rich-text document. Absent for legacy plain comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_state: Option<String>,
    pub author_id: String,
    pub author: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Always a root comment: threads are flat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub mentions: Vec<MentionRef>,
    #[serde(default)]
    pub tags: Vec<MentionRef>,
    #[serde(default)]
    pub reactions: Vec<CommentReaction>,
    #[serde(default)]
    pub status: CommentStatus,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == CommentStatus::Active
    }

    /// Whether this comment is attached to the given source.
    ///
    /// A missing `source_type` filter matches any type.
    pub fn matches_source(&self, source_id: &str, source_type: Option<&str>) -> bool {
        self.source_id.as_deref() == Some(source_id)
            && source_type.is_none_or(|t| self.source_type.as_deref() == Some(t))
    }

    /// The reaction of `reaction_type` left by `user_id`, if any.
    pub fn reaction_by(&self, user_id: &str, reaction_type: &str) -> Option<&CommentReaction> {
        self.reactions
            .iter()
            .find(|r| r.user_id == user_id && r.reaction_type == reaction_type)
    }
}

/// Partial update of a comment. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct CommentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<MentionRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<MentionRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<CommentReaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CommentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CommentPatch {
    /// Shallow-merge the set fields into `comment`.
    pub fn apply_to(&self, comment: &mut Comment) {
        if let Some(content) = &self.content {
            comment.content = content.clone();
        }
        if let Some(editor_state) = &self.editor_state {
            comment.editor_state = Some(editor_state.clone());
        }
        if let Some(mentions) = &self.mentions {
            comment.mentions = mentions.clone();
        }
        if let Some(tags) = &self.tags {
            comment.tags = tags.clone();
        }
        if let Some(reactions) = &self.reactions {
            comment.reactions = reactions.clone();
        }
        if let Some(status) = self.status {
            comment.status = status;
        }
        if let Some(is_edited) = self.is_edited {
            comment.is_edited = is_edited;
        }
        if let Some(updated_at) = self.updated_at {
            comment.updated_at = updated_at;
        }
    }

    /// Patch carrying every mutable field of `comment`.
    pub fn from_comment(comment: &Comment) -> Self {
        Self {
            content: Some(comment.content.clone()),
            editor_state: comment.editor_state.clone(),
            mentions: Some(comment.mentions.clone()),
            tags: Some(comment.tags.clone()),
            reactions: Some(comment.reactions.clone()),
            status: Some(comment.status),
            is_edited: Some(comment.is_edited),
            updated_at: Some(comment.updated_at),
        }
    }
}

/// Input of the rich-text creation path. Ids and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    pub editor_state: String,
    pub author: User,
    pub mentions: Vec<MentionRef>,
    pub tags: Vec<MentionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    /// Build a new comment, extracting mentions and tags from `editor_state`.
    pub fn new(content: impl Into<String>, editor_state: impl Into<String>, author: User) -> Self {
        let editor_state = editor_state.into();
        let refs = extract_mentions_and_tags(&editor_state);
        Self {
            content: content.into(),
            editor_state,
            author,
            mentions: refs.mentions,
            tags: refs.tags,
            source_id: None,
            source_type: None,
            parent_id: None,
        }
    }

    /// Replace the extracted references with caller-supplied ones.
    pub fn with_refs(mut self, mentions: Vec<MentionRef>, tags: Vec<MentionRef>) -> Self {
        self.mentions = mentions;
        self.tags = tags;
        self
    }

    pub fn with_source(mut self, source_id: Option<String>, source_type: Option<String>) -> Self {
        self.source_id = source_id;
        self.source_type = source_type;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<CommentId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Assign a fresh id and timestamps, producing the stored record.
    pub fn into_comment(self) -> Comment {
        let now = Utc::now();
        Comment {
            id: CommentId::generate(),
            content: self.content,
            editor_state: Some(self.editor_state),
            author_id: self.author.id.clone(),
            author: self.author,
            source_id: self.source_id,
            source_type: self.source_type,
            parent_id: self.parent_id,
            created_at: now,
            updated_at: now,
            is_edited: false,
            mentions: self.mentions,
            tags: self.tags,
            reactions: Vec::new(),
            status: CommentStatus::Active,
        }
    }
}

/// Input of the rich-text update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorUpdate {
    pub content: String,
    pub editor_state: String,
    pub mentions: Vec<MentionRef>,
    pub tags: Vec<MentionRef>,
    /// Edit time, fixed when the update is built so every copy patches the same value.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl EditorUpdate {
    pub fn new(content: impl Into<String>, editor_state: impl Into<String>) -> Self {
        let editor_state = editor_state.into();
        let refs = extract_mentions_and_tags(&editor_state);
        Self {
            content: content.into(),
            editor_state,
            mentions: refs.mentions,
            tags: refs.tags,
            updated_at: Utc::now(),
        }
    }

    pub fn with_refs(mut self, mentions: Vec<MentionRef>, tags: Vec<MentionRef>) -> Self {
        self.mentions = mentions;
        self.tags = tags;
        self
    }

    /// The patch this update applies: new body, refs, edit time, marked edited.
    pub fn into_patch(self) -> CommentPatch {
        CommentPatch {
            content: Some(self.content),
            editor_state: Some(self.editor_state),
            mentions: Some(self.mentions),
            tags: Some(self.tags),
            is_edited: Some(true),
            updated_at: Some(self.updated_at),
            ..CommentPatch::default()
        }
    }
}

/// A root comment grouped with its direct replies. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub id: CommentId,
    pub root_comment: Comment,
    pub replies: Vec<Comment>,
    pub total_replies: usize,
    pub last_activity: DateTime<Utc>,
}

impl CommentThread {
    /// Group `root` with `replies`, sorting replies oldest-first.
    pub fn new(root: Comment, mut replies: Vec<Comment>) -> Self {
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let last_activity = replies
            .iter()
            .map(|r| r.created_at)
            .max()
            .unwrap_or(root.created_at);
        Self {
            id: root.id.clone(),
            total_replies: replies.len(),
            root_comment: root,
            replies,
            last_activity,
        }
    }
}
