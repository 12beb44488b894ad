use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use comment_types::{Comment, CommentId, CommentReaction, ReactionId};

/// Operation kind reported with [`CommentEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorAction {
    Add,
    Update,
    Delete,
    Reaction,
    Load,
    Clear,
    Threads,
}

impl ErrorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorAction::Add => "add",
            ErrorAction::Update => "update",
            ErrorAction::Delete => "delete",
            ErrorAction::Reaction => "reaction",
            ErrorAction::Load => "load",
            ErrorAction::Clear => "clear",
            ErrorAction::Threads => "threads",
        }
    }

    /// Message recorded in `state.error` when this operation fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            ErrorAction::Add => "Failed to add comment",
            ErrorAction::Update => "Failed to update comment",
            ErrorAction::Delete => "Failed to delete comment",
            ErrorAction::Reaction => "Failed to update reaction",
            ErrorAction::Load => "Failed to load comments",
            ErrorAction::Clear => "Failed to clear comments",
            ErrorAction::Threads => "Failed to load comment threads",
        }
    }
}

impl fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Loaded,
    Added,
    Updated,
    Deleted,
    ReactionAdded,
    ReactionRemoved,
    Cleared,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Loaded,
        EventKind::Added,
        EventKind::Updated,
        EventKind::Deleted,
        EventKind::ReactionAdded,
        EventKind::ReactionRemoved,
        EventKind::Cleared,
        EventKind::Error,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Loaded => "comments:loaded",
            EventKind::Added => "comment:added",
            EventKind::Updated => "comment:updated",
            EventKind::Deleted => "comment:deleted",
            EventKind::ReactionAdded => "reaction:added",
            EventKind::ReactionRemoved => "reaction:removed",
            EventKind::Cleared => "comments:cleared",
            EventKind::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// A comment lifecycle event, emitted after the state change it describes.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentEvent {
    Loaded {
        comments: Vec<Comment>,
    },
    Added {
        comment: Comment,
    },
    Updated {
        comment: Comment,
        previous_content: String,
    },
    Deleted {
        comment_id: CommentId,
    },
    ReactionAdded {
        comment_id: CommentId,
        reaction: CommentReaction,
    },
    ReactionRemoved {
        comment_id: CommentId,
        reaction_id: ReactionId,
    },
    Cleared,
    Error {
        error: String,
        action: ErrorAction,
    },
}

impl CommentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CommentEvent::Loaded { .. } => EventKind::Loaded,
            CommentEvent::Added { .. } => EventKind::Added,
            CommentEvent::Updated { .. } => EventKind::Updated,
            CommentEvent::Deleted { .. } => EventKind::Deleted,
            CommentEvent::ReactionAdded { .. } => EventKind::ReactionAdded,
            CommentEvent::ReactionRemoved { .. } => EventKind::ReactionRemoved,
            CommentEvent::Cleared => EventKind::Cleared,
            CommentEvent::Error { .. } => EventKind::Error,
        }
    }
}

type Listener = Arc<dyn Fn(&CommentEvent) + Send + Sync>;

struct Registered {
    id: u64,
    kind: EventKind,
    listener: Listener,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<Registered>,
}

/// Publish/subscribe channel for one provider.
///
/// Listeners run synchronously in registration order. A panicking listener
/// is logged and skipped; the remaining listeners still run.
#[derive(Clone, Default)]
pub struct CommentEvents {
    inner: Arc<Mutex<Listeners>>,
}

impl CommentEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&CommentEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push(Registered {
            id,
            kind,
            listener: Arc::new(listener),
        });
        Subscription {
            listeners: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn emit(&self, event: &CommentEvent) {
        let kind = event.kind();
        // Snapshot so listeners may subscribe or unsubscribe while being called.
        let targets: Vec<Listener> = self
            .lock()
            .entries
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.listener.clone())
            .collect();

        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("listener for {} panicked", kind.name());
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().entries.iter().filter(|r| r.kind == kind).count()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

/// Handle returned by [`CommentEvents::on`].
///
/// Dropping it keeps the listener registered; call [`unsubscribe`](Self::unsubscribe).
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Returns `false` when it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|r| r.id != self.id);
        listeners.entries.len() < before
    }
}
