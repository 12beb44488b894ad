mod extract;
mod id;
mod mention;
mod model;
mod time;

pub use extract::{ExtractedRefs, extract_mentions_and_tags, plain_text};
pub use id::{CommentId, ReactionId};
pub use mention::{MentionDirectory, MentionRef, MentionTag, MentionUser};
pub use model::{
    Comment, CommentPatch, CommentReaction, CommentStatus, CommentThread, EditorUpdate,
    NewComment, User,
};
pub use time::format_relative_time;
