//! Notification primitives.

use std::fmt;

use nestmodel_core::ModelRef;

/// What happened to an observed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The row was inserted.
    Create,
    /// The row (or one of its nested children) changed.
    Update,
    /// The row was deleted.
    Delete,
}

impl Action {
    /// Wire name of the action.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`NotificationHandler`].
///
/// Handler errors never reach the writer: the observer logs them and moves
/// on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The subscriber side is gone.
    #[error("notification channel closed")]
    Closed,
    /// Any other handler failure.
    #[error("notification failed: {0}")]
    Handler(String),
}

/// Receives change notifications after the transaction commits.
pub trait NotificationHandler: Send + Sync + 'static {
    /// Push `action` for `instance` to subscribers.
    fn database_event(&self, instance: &ModelRef, action: Action) -> Result<(), NotifyError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(&ModelRef, Action) -> Result<(), NotifyError> + Send + Sync + 'static,
{
    fn database_event(&self, instance: &ModelRef, action: Action) -> Result<(), NotifyError> {
        self(instance, action)
    }
}
