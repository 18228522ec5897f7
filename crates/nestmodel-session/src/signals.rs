//! Row change signals.
//!
//! Listeners are registered per (signal, sender model) under a unique id and
//! receive every matching [`RowEvent`]. A listener cannot touch the session;
//! it may only defer work through the [`TxHooks`] it is handed.

use std::fmt;
use std::sync::Arc;

use nestmodel_core::{ModelRef, Row};

use crate::hooks::TxHooks;

/// Signal a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// A row was inserted or updated.
    PostSave,
    /// A row was deleted.
    PostDelete,
    /// Links of a many-to-many accessor changed.
    M2mChanged,
}

/// What happened to the links of a many-to-many accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum M2mAction {
    /// Links were added.
    Add,
    /// Links were removed.
    Remove,
}

/// Payload of an emitted signal.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `post_save`.
    PostSave {
        /// True for inserts.
        created: bool,
    },
    /// `post_delete`.
    PostDelete,
    /// `m2m_changed`.
    M2mChanged {
        /// Accessor on `RowEvent::model` whose links changed.
        accessor: String,
        /// Add or remove.
        action: M2mAction,
        /// Related primary keys affected.
        pk_set: Vec<i64>,
    },
}

impl EventKind {
    /// Signal this event is delivered on.
    #[must_use]
    pub fn signal(&self) -> Signal {
        match self {
            EventKind::PostSave { .. } => Signal::PostSave,
            EventKind::PostDelete => Signal::PostDelete,
            EventKind::M2mChanged { .. } => Signal::M2mChanged,
        }
    }
}

/// A row change delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEvent {
    /// What happened.
    pub kind: EventKind,
    /// Model (sender) of the row.
    pub model: String,
    /// Primary key of the row.
    pub pk: i64,
    /// Row after a save, before a delete.
    pub row: Row,
}

impl RowEvent {
    /// Identity of the row.
    #[must_use]
    pub fn instance(&self) -> ModelRef {
        ModelRef::new(&self.model, self.pk)
    }
}

/// A signal listener.
pub type Listener = Arc<dyn Fn(&RowEvent, &mut TxHooks) + Send + Sync>;

struct Registration {
    uid: String,
    signal: Signal,
    sender: String,
    listener: Listener,
}

/// Listener table owned by a session.
#[derive(Default)]
pub struct Signals {
    registrations: Vec<Registration>,
}

impl Signals {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `signal` sent by `sender`.
    ///
    /// Returns `false` (and keeps the existing registration) if `uid` is
    /// already connected.
    pub fn connect(
        &mut self,
        signal: Signal,
        sender: impl Into<String>,
        uid: impl Into<String>,
        listener: Listener,
    ) -> bool {
        let uid = uid.into();
        if self.is_connected(&uid) {
            tracing::trace!(uid = %uid, "Listener already connected");
            return false;
        }
        let sender = sender.into();
        tracing::debug!(uid = %uid, ?signal, sender = %sender, "Connecting listener");
        self.registrations.push(Registration {
            uid,
            signal,
            sender,
            listener,
        });
        true
    }

    /// Remove the registration with this uid. Returns `true` if one existed.
    pub fn disconnect(&mut self, uid: &str) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.uid != uid);
        let removed = before != self.registrations.len();
        if removed {
            tracing::debug!(uid, "Disconnected listener");
        }
        removed
    }

    /// True if a registration with this uid exists.
    pub fn is_connected(&self, uid: &str) -> bool {
        self.registrations.iter().any(|r| r.uid == uid)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True if nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Listeners interested in `event`, in registration order.
    pub(crate) fn listeners_for(&self, event: &RowEvent) -> Vec<Listener> {
        let signal = event.kind.signal();
        self.registrations
            .iter()
            .filter(|r| r.signal == signal && r.sender == event.model)
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| &r.uid))
            .finish()
    }
}
