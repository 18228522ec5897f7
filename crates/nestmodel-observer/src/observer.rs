//! Base model observer.
//!
//! A [`ModelObserver`] forwards saves and deletes of one model to a
//! [`NotificationHandler`] once the surrounding transaction commits. Its
//! dispatcher also implements the deduplicated "parent changed" schedule used
//! for many-to-many changes and by the nested observer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use nestmodel_core::{ModelRef, Registry, RelationshipKind, Result};
use nestmodel_session::{EventKind, Listener, RowEvent, Session, Signal, TxHooks};

use crate::ObserverConfig;
use crate::action::{Action, NotificationHandler};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_observer_id() -> u64 {
    NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed)
}

type Pending = Mutex<HashSet<ModelRef>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashSet<ModelRef>> {
    pending.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered poisoned pending-update set");
        poisoned.into_inner()
    })
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Delivers notifications and tracks parents with an update in flight.
pub(crate) struct Dispatcher {
    id: u64,
    partition: String,
    handler: Box<dyn NotificationHandler>,
    pending: Pending,
}

/// Removes a pending pair when the commit hook ends, however it ends.
struct PendingGuard<'a> {
    pending: &'a Pending,
    key: &'a ModelRef,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.key);
    }
}

impl Dispatcher {
    fn new(id: u64, partition: String, handler: Box<dyn NotificationHandler>) -> Self {
        Self {
            id,
            partition,
            handler,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Call the handler, logging failures.
    pub(crate) fn send(&self, instance: &ModelRef, action: Action) {
        tracing::debug!(
            observer = self.id,
            partition = %self.partition,
            %instance,
            %action,
            "Sending database event"
        );
        if let Err(error) = self.handler.database_event(instance, action) {
            tracing::warn!(observer = self.id, %instance, %action, %error, "Notification handler failed");
        }
    }

    /// Send `action` for `instance` after commit.
    pub(crate) fn defer(self: &Arc<Self>, hooks: &mut TxHooks, instance: ModelRef, action: Action) {
        let this = Arc::clone(self);
        hooks.on_commit(move || this.send(&instance, action));
    }

    /// Schedule one `Update` for `parent` per transaction.
    ///
    /// A pair already pending is not scheduled again. The pair is released
    /// after the handler returns (or panics) and when the transaction that
    /// scheduled it rolls back.
    pub(crate) fn schedule_update(self: &Arc<Self>, hooks: &mut TxHooks, parent: ModelRef) {
        if !lock(&self.pending).insert(parent.clone()) {
            tracing::trace!(observer = self.id, %parent, "Parent update already pending");
            return;
        }
        tracing::debug!(observer = self.id, %parent, "Scheduled parent update");

        let this = Arc::clone(self);
        let key = parent.clone();
        hooks.on_commit(move || {
            let _guard = PendingGuard {
                pending: &this.pending,
                key: &key,
            };
            this.send(&key, Action::Update);
        });

        let this = Arc::clone(self);
        hooks.on_rollback(move || {
            lock(&this.pending).remove(&parent);
        });
    }

    /// Snapshot of the pending set, sorted.
    pub(crate) fn pending(&self) -> Vec<ModelRef> {
        let mut out: Vec<_> = lock(&self.pending).iter().cloned().collect();
        out.sort();
        out
    }
}

// ============================================================================
// ModelObserver
// ============================================================================

/// Notifies a handler about saves and deletes of one model.
pub struct ModelObserver {
    model: String,
    config: ObserverConfig,
    m2m_senders: Vec<(String, String)>,
    dispatcher: Arc<Dispatcher>,
}

impl ModelObserver {
    /// Create an observer for `model`.
    pub fn new(
        registry: &Registry,
        model: impl Into<String>,
        config: ObserverConfig,
        handler: impl NotificationHandler,
    ) -> Result<Self> {
        let model = model.into();
        registry.model(&model)?;
        let m2m_senders = if config.many_to_many {
            m2m_senders(registry, &model)
        } else {
            Vec::new()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            next_observer_id(),
            config.partition.clone(),
            Box::new(handler),
        ));
        Ok(Self {
            model,
            config,
            m2m_senders,
            dispatcher,
        })
    }

    /// Unique id of this observer (used in listener uids).
    pub fn id(&self) -> u64 {
        self.dispatcher.id
    }

    /// Observed model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Observer configuration.
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Parents with an update in flight.
    pub fn pending(&self) -> Vec<ModelRef> {
        self.dispatcher.pending()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn uid(&self, suffix: &str) -> String {
        format!("{}-{}-{suffix}", self.id(), self.model)
    }

    /// Register the listeners on `session`. Returns how many were added.
    pub fn connect(&self, session: &mut Session) -> usize {
        let signals = session.signals_mut();
        let mut added = 0;

        let dispatcher = Arc::clone(&self.dispatcher);
        let on_save: Listener = Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
            let action = match event.kind {
                EventKind::PostSave { created: true } => Action::Create,
                _ => Action::Update,
            };
            dispatcher.defer(hooks, event.instance(), action);
        });
        added += usize::from(signals.connect(Signal::PostSave, &self.model, self.uid("save"), on_save));

        let dispatcher = Arc::clone(&self.dispatcher);
        let on_delete: Listener = Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
            dispatcher.defer(hooks, event.instance(), Action::Delete);
        });
        added += usize::from(signals.connect(Signal::PostDelete, &self.model, self.uid("delete"), on_delete));

        if self.config.many_to_many {
            let dispatcher = Arc::clone(&self.dispatcher);
            let own: Listener = Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
                dispatcher.schedule_update(hooks, event.instance());
            });
            added += usize::from(signals.connect(Signal::M2mChanged, &self.model, self.uid("m2m"), own));

            for (sender, accessor) in &self.m2m_senders {
                let dispatcher = Arc::clone(&self.dispatcher);
                let model = self.model.clone();
                let wanted = accessor.clone();
                let far: Listener = Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
                    let EventKind::M2mChanged { accessor, pk_set, .. } = &event.kind else {
                        return;
                    };
                    if *accessor != wanted {
                        return;
                    }
                    for pk in pk_set {
                        dispatcher.schedule_update(hooks, ModelRef::new(&model, *pk));
                    }
                });
                let uid = format!("{}-{sender}-{accessor}-m2m", self.id());
                added += usize::from(signals.connect(Signal::M2mChanged, sender, uid, far));
            }
        }

        tracing::debug!(observer = self.id(), model = %self.model, added, "Connected model observer");
        added
    }

    /// Remove every registration made by [`connect`](Self::connect).
    pub fn disconnect(&self, session: &mut Session) -> usize {
        let signals = session.signals_mut();
        let mut uids = vec![self.uid("save"), self.uid("delete"), self.uid("m2m")];
        uids.extend(
            self.m2m_senders
                .iter()
                .map(|(sender, accessor)| format!("{}-{sender}-{accessor}-m2m", self.id())),
        );
        uids.iter().filter(|uid| signals.disconnect(uid)).count()
    }
}

impl std::fmt::Debug for ModelObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelObserver")
            .field("id", &self.id())
            .field("model", &self.model)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Accessors on other models whose link changes touch `model`.
fn m2m_senders(registry: &Registry, model: &str) -> Vec<(String, String)> {
    registry
        .relationships(model)
        .into_iter()
        .filter(|rel| rel.kind == RelationshipKind::ManyToMany && rel.through.is_none())
        .filter_map(|rel| {
            registry
                .relationships(&rel.related_model)
                .into_iter()
                .find(|other| {
                    other.kind == RelationshipKind::ManyToMany
                        && other.related_model == model
                        && other.field == rel.field
                        && other.direction != rel.direction
                })
                .map(|other| (rel.related_model.clone(), other.name))
        })
        .collect()
}
