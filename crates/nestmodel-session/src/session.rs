//! The in-memory relational session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use nestmodel_core::{
    Error, FieldKind, ModelMeta, ModelRef, ReferentialAction, Registry, RelationshipInfo,
    RelationshipKind, Result, Row, Value,
};

use crate::SessionConfig;
use crate::hooks::TxHooks;
use crate::signals::{EventKind, M2mAction, RowEvent, Signals};

/// Link table key: (declaring model, many-to-many field).
type LinkKey = (String, String);

#[derive(Debug, Clone, Default)]
struct Store {
    tables: BTreeMap<String, BTreeMap<i64, Row>>,
    /// Pairs are (declaring-side pk, target-side pk).
    links: BTreeMap<LinkKey, BTreeSet<(i64, i64)>>,
}

#[derive(Debug)]
struct Frame {
    snapshot: Store,
    hooks: TxHooks,
}

/// Debug information about session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDebugInfo {
    /// Tables holding at least one row.
    pub tables: usize,
    /// Total rows across all tables.
    pub rows: usize,
    /// Total many-to-many links.
    pub links: usize,
    /// Transaction nesting depth (0 outside a transaction).
    pub depth: usize,
    /// Connected signal listeners.
    pub listeners: usize,
}

/// In-memory relational store with signals and nested transactions.
///
/// Every mutation checks the constraints declared in the [`Registry`]
/// (not-null, unique, foreign keys, ON DELETE policies) and emits a
/// [`RowEvent`] to the connected listeners. Listeners defer work with
/// commit/rollback hooks that run when the outermost transaction ends.
#[derive(Debug)]
pub struct Session {
    registry: Arc<Registry>,
    store: Store,
    frames: Vec<Frame>,
    signals: Signals,
    config: SessionConfig,
}

impl Session {
    /// Create a new session over a registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, SessionConfig::default())
    }

    /// Create a new session with custom configuration.
    pub fn with_config(registry: Arc<Registry>, config: SessionConfig) -> Self {
        Self {
            registry,
            store: Store::default(),
            frames: Vec::new(),
            signals: Signals::new(),
            config,
        }
    }

    /// Model metadata.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared handle to the model metadata.
    pub fn shared_registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connected listeners.
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Connect or disconnect listeners.
    pub fn signals_mut(&mut self) -> &mut Signals {
        &mut self.signals
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a row by primary key.
    pub fn get(&self, model: &str, pk: i64) -> Option<&Row> {
        self.store.tables.get(model).and_then(|t| t.get(&pk))
    }

    /// Get a row by primary key or fail with `Error::NotFound`.
    pub fn require(&self, model: &str, pk: i64) -> Result<&Row> {
        self.get(model, pk).ok_or_else(|| Error::NotFound {
            model: model.to_string(),
            pk,
        })
    }

    /// True if the row exists.
    pub fn exists(&self, model: &str, pk: i64) -> bool {
        self.get(model, pk).is_some()
    }

    /// All primary keys of a model, ascending.
    pub fn pks(&self, model: &str) -> Vec<i64> {
        self.store
            .tables
            .get(model)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }

    /// All rows of a model, ascending by primary key.
    pub fn rows<'a>(&'a self, model: &str) -> impl Iterator<Item = (i64, &'a Row)> + use<'a> {
        self.store
            .tables
            .get(model)
            .into_iter()
            .flat_map(|t| t.iter().map(|(pk, row)| (*pk, row)))
    }

    /// Number of rows of a model.
    pub fn count(&self, model: &str) -> usize {
        self.store.tables.get(model).map_or(0, BTreeMap::len)
    }

    /// Primary keys of rows whose `column` equals `value`, ascending.
    pub fn filter(&self, model: &str, column: &str, value: &Value) -> Vec<i64> {
        self.rows(model)
            .filter(|(_, row)| row.get(column) == Some(value))
            .map(|(pk, _)| pk)
            .collect()
    }

    /// Primary keys reachable from a row through an accessor, ascending.
    ///
    /// Works for forward and reverse accessors of every cardinality; a single
    /// relation yields at most one key.
    pub fn related_pks(&self, model: &str, accessor: &str, pk: i64) -> Result<Vec<i64>> {
        let rel = self.relation(model, accessor)?;
        let row = self.require(model, pk)?;
        let this = Value::BigInt(pk);

        let mut pks = match (rel.kind, &rel.through) {
            _ if rel.is_local_column() => row.get_i64(&rel.field).into_iter().collect(),
            _ if rel.is_remote_column() => self.filter(&rel.related_model, &rel.field, &this),
            (RelationshipKind::ManyToMany, Some(through)) => self
                .filter(&through.model, &through.source_field, &this)
                .into_iter()
                .filter_map(|j| {
                    self.get(&through.model, j)
                        .and_then(|r| r.get_i64(&through.target_field))
                })
                .collect(),
            (RelationshipKind::ManyToMany, None) => {
                let (key, _) = link_slot(&rel, pk, 0);
                let reverse = rel.is_reverse();
                self.store
                    .links
                    .get(&key)
                    .map(|set| {
                        set.iter()
                            .filter_map(|&(source, target)| match reverse {
                                false if source == pk => Some(target),
                                true if target == pk => Some(source),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        };
        pks.sort_unstable();
        pks.dedup();
        Ok(pks)
    }

    fn relation(&self, model: &str, accessor: &str) -> Result<RelationshipInfo> {
        self.registry.model(model)?;
        self.registry
            .relation(model, accessor)
            .ok_or_else(|| Error::UnknownField {
                model: model.to_string(),
                field: accessor.to_string(),
            })
    }

    // ========================================================================
    // Row Writes
    // ========================================================================

    /// Insert a row and return its primary key.
    ///
    /// A missing or NULL primary key is assigned as `max(existing) + 1`.
    /// Omitted columns take their default, or NULL.
    #[tracing::instrument(level = "debug", skip(self, values))]
    pub fn insert(&mut self, model: &str, values: Row) -> Result<i64> {
        let registry = Arc::clone(&self.registry);
        let meta = registry.model(model)?;
        check_known_columns(meta, &values)?;

        let pk_name = meta.pk_name();
        let pk = match values.get(pk_name) {
            None | Some(Value::Null) => self.next_pk(model),
            Some(Value::BigInt(pk)) if self.exists(model, *pk) => {
                return Err(Error::integrity(format_args!(
                    "UNIQUE constraint failed: {model}.{pk_name}"
                )));
            }
            Some(Value::BigInt(pk)) => *pk,
            Some(other) => {
                return Err(Error::integrity(format_args!(
                    "datatype mismatch: {model}.{pk_name} got {}",
                    other.type_name()
                )));
            }
        };

        let mut row = Row::new();
        for field in meta.columns() {
            let value = if field.is_pk() {
                Value::BigInt(pk)
            } else {
                values
                    .get(&field.name)
                    .cloned()
                    .or_else(|| field.default.clone())
                    .unwrap_or(Value::Null)
            };
            row.set(&field.name, value);
        }
        self.check_row(meta, pk, &row)?;

        self.store
            .tables
            .entry(model.to_string())
            .or_default()
            .insert(pk, row.clone());
        tracing::debug!(model, pk, "Inserted row");

        self.emit(RowEvent {
            kind: EventKind::PostSave { created: true },
            model: model.to_string(),
            pk,
            row,
        });
        Ok(pk)
    }

    /// Update some columns of an existing row.
    #[tracing::instrument(level = "debug", skip(self, changes))]
    pub fn update(&mut self, model: &str, pk: i64, changes: Row) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let meta = registry.model(model)?;
        check_known_columns(meta, &changes)?;
        if changes
            .get(meta.pk_name())
            .is_some_and(|v| v != &Value::BigInt(pk))
        {
            return Err(Error::integrity(format_args!(
                "primary key of {model} {pk} cannot change"
            )));
        }

        let mut row = self.require(model, pk)?.clone();
        row.merge(&changes);
        self.check_row(meta, pk, &row)?;

        self.store
            .tables
            .entry(model.to_string())
            .or_default()
            .insert(pk, row.clone());
        tracing::debug!(model, pk, columns = changes.len(), "Updated row");

        self.emit(RowEvent {
            kind: EventKind::PostSave { created: false },
            model: model.to_string(),
            pk,
            row,
        });
        Ok(())
    }

    /// Delete a row, applying the ON DELETE policy of every reference to it.
    ///
    /// Cascades run depth-first and emit `PostDelete` for each removed row.
    /// SET NULL / SET DEFAULT rewrite the referencing column without a signal.
    /// RESTRICT / NO ACTION fail and leave the session unchanged.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn delete(&mut self, model: &str, pk: i64) -> Result<()> {
        self.atomic(|s| {
            let mut visiting = BTreeSet::new();
            s.delete_inner(model, pk, &mut visiting)
        })
    }

    fn delete_inner(
        &mut self,
        model: &str,
        pk: i64,
        visiting: &mut BTreeSet<ModelRef>,
    ) -> Result<()> {
        let row = self.require(model, pk)?.clone();
        visiting.insert(ModelRef::new(model, pk));

        let registry = Arc::clone(&self.registry);
        let this = Value::BigInt(pk);
        for referencing in registry.referencing(model) {
            let field = referencing.field;
            match &field.kind {
                FieldKind::ForeignKey(fk) | FieldKind::OneToOne(fk) => {
                    let dependents: Vec<i64> = self
                        .filter(referencing.model, &field.name, &this)
                        .into_iter()
                        .filter(|d| !visiting.contains(&ModelRef::new(referencing.model, *d)))
                        .collect();
                    let Some(&first) = dependents.first() else {
                        continue;
                    };
                    match fk.on_delete {
                        ReferentialAction::Cascade => {
                            for dependent in dependents {
                                if self.exists(referencing.model, dependent) {
                                    tracing::trace!(
                                        model = referencing.model,
                                        pk = dependent,
                                        "Cascading delete"
                                    );
                                    self.delete_inner(referencing.model, dependent, visiting)?;
                                }
                            }
                        }
                        ReferentialAction::SetNull | ReferentialAction::SetDefault => {
                            let replacement = match fk.on_delete {
                                ReferentialAction::SetDefault => {
                                    field.default.clone().unwrap_or(Value::Null)
                                }
                                _ => Value::Null,
                            };
                            if replacement.is_null() && !field.nullable {
                                return Err(Error::integrity(format_args!(
                                    "NOT NULL constraint failed: {}.{}",
                                    referencing.model, field.name
                                )));
                            }
                            if let Some(table) = self.store.tables.get_mut(referencing.model) {
                                for dependent in dependents {
                                    if let Some(r) = table.get_mut(&dependent) {
                                        r.set(&field.name, replacement.clone());
                                    }
                                }
                            }
                        }
                        ReferentialAction::NoAction | ReferentialAction::Restrict => {
                            return Err(Error::integrity(format_args!(
                                "cannot delete {model} {pk}: {} {first} references it through `{}`",
                                referencing.model, field.name
                            )));
                        }
                    }
                }
                FieldKind::ManyToMany(m2m) if m2m.through.is_none() => {
                    let key = (referencing.model.to_string(), field.name.clone());
                    if let Some(set) = self.store.links.get_mut(&key) {
                        set.retain(|&(_, target)| target != pk);
                    }
                }
                _ => {}
            }
        }

        if let Ok(meta) = registry.model(model) {
            for field in meta.fields() {
                if field.many_to_many_info().is_some_and(|m| m.through.is_none()) {
                    let key = (model.to_string(), field.name.clone());
                    if let Some(set) = self.store.links.get_mut(&key) {
                        set.retain(|&(source, _)| source != pk);
                    }
                }
            }
        }

        if let Some(table) = self.store.tables.get_mut(model) {
            table.remove(&pk);
        }
        tracing::debug!(model, pk, "Deleted row");

        self.emit(RowEvent {
            kind: EventKind::PostDelete,
            model: model.to_string(),
            pk,
            row,
        });
        Ok(())
    }

    fn next_pk(&self, model: &str) -> i64 {
        self.store
            .tables
            .get(model)
            .and_then(|t| t.keys().next_back())
            .map_or(1, |max| max + 1)
    }

    fn check_row(&self, meta: &ModelMeta, pk: i64, row: &Row) -> Result<()> {
        let model = meta.name();
        for field in meta.columns().filter(|f| !f.is_pk()) {
            let value = row.get(&field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !field.nullable {
                    return Err(Error::integrity(format_args!(
                        "NOT NULL constraint failed: {model}.{}",
                        field.name
                    )));
                }
                continue;
            }

            if field.sql_type().is_some_and(|t| t.coerce(value).is_none()) {
                return Err(Error::integrity(format_args!(
                    "datatype mismatch: {model}.{} got {}",
                    field.name,
                    value.type_name()
                )));
            }

            if field.unique
                && self
                    .rows(model)
                    .any(|(other, r)| other != pk && r.get(&field.name) == Some(value))
            {
                return Err(Error::integrity(format_args!(
                    "UNIQUE constraint failed: {model}.{}",
                    field.name
                )));
            }

            if self.config.enforce_foreign_keys {
                if let Some(fk) = field.foreign_key_info() {
                    if !value.as_i64().is_some_and(|t| self.exists(&fk.target, t)) {
                        return Err(Error::integrity(format_args!(
                            "FOREIGN KEY constraint failed: {model}.{} -> {}",
                            field.name, fk.target
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Many-to-many Links
    // ========================================================================

    /// Link `pk` to `other` through a many-to-many accessor (forward or reverse).
    ///
    /// Returns `false` if the link already existed. Accessors declared with a
    /// through model cannot be linked directly; insert the junction row.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn link(&mut self, model: &str, accessor: &str, pk: i64, other: i64) -> Result<bool> {
        let rel = self.link_relation(model, accessor)?;
        let row = self.require(model, pk)?.clone();
        self.require(&rel.related_model, other)?;

        let (key, pair) = link_slot(&rel, pk, other);
        let added = self.store.links.entry(key).or_default().insert(pair);
        if added {
            self.emit(RowEvent {
                kind: EventKind::M2mChanged {
                    accessor: accessor.to_string(),
                    action: M2mAction::Add,
                    pk_set: vec![other],
                },
                model: model.to_string(),
                pk,
                row,
            });
        }
        Ok(added)
    }

    /// Remove a many-to-many link. Returns `false` if it did not exist.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn unlink(&mut self, model: &str, accessor: &str, pk: i64, other: i64) -> Result<bool> {
        let rel = self.link_relation(model, accessor)?;
        let row = self.require(model, pk)?.clone();

        let (key, pair) = link_slot(&rel, pk, other);
        let removed = self
            .store
            .links
            .get_mut(&key)
            .is_some_and(|set| set.remove(&pair));
        if removed {
            self.emit(RowEvent {
                kind: EventKind::M2mChanged {
                    accessor: accessor.to_string(),
                    action: M2mAction::Remove,
                    pk_set: vec![other],
                },
                model: model.to_string(),
                pk,
                row,
            });
        }
        Ok(removed)
    }

    fn link_relation(&self, model: &str, accessor: &str) -> Result<RelationshipInfo> {
        let rel = self.relation(model, accessor)?;
        if rel.kind != RelationshipKind::ManyToMany {
            return Err(Error::config(format_args!(
                "`{model}.{accessor}` is not a many-to-many accessor"
            )));
        }
        if let Some(through) = &rel.through {
            return Err(Error::config(format_args!(
                "`{model}.{accessor}` goes through `{}`; create junction rows instead",
                through.model
            )));
        }
        Ok(rel)
    }

    // ========================================================================
    // Transaction Management
    // ========================================================================

    /// Begin a transaction (a savepoint when one is already active).
    pub fn begin(&mut self) {
        tracing::info!(depth = self.frames.len() + 1, "Beginning transaction");
        self.frames.push(Frame {
            snapshot: self.store.clone(),
            hooks: TxHooks::new(),
        });
    }

    /// Commit the innermost transaction.
    ///
    /// Hooks of an inner transaction move to its parent; the outermost commit
    /// runs every commit hook in registration order.
    pub fn commit(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or(Error::InvalidState("commit without an active transaction"))?;
        tracing::info!(
            depth = self.frames.len() + 1,
            hooks = frame.hooks.commit_len(),
            "Committing transaction"
        );
        match self.frames.last_mut() {
            Some(parent) => parent.hooks.absorb(frame.hooks),
            None => frame.hooks.run_commit(),
        }
        Ok(())
    }

    /// Roll back the innermost transaction.
    ///
    /// Restores the state captured by the matching `begin`, discards the
    /// frame's commit hooks and runs its rollback hooks.
    pub fn rollback(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or(Error::InvalidState("rollback without an active transaction"))?;
        tracing::info!(
            depth = self.frames.len() + 1,
            discarded = frame.hooks.commit_len(),
            "Rolling back transaction"
        );
        self.store = frame.snapshot;
        frame.hooks.run_rollback();
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin();
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Transaction body failed");
                self.rollback()?;
                Err(e)
            }
        }
    }

    /// Whether we're in a transaction.
    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Transaction nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `hook` after the outermost commit (immediately in autocommit).
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = TxHooks::new();
        hooks.on_commit(hook);
        self.absorb_hooks(hooks);
    }

    /// Run `hook` if the current transaction rolls back.
    pub fn on_rollback(&mut self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = TxHooks::new();
        hooks.on_rollback(hook);
        self.absorb_hooks(hooks);
    }

    fn absorb_hooks(&mut self, hooks: TxHooks) {
        if hooks.is_empty() {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.hooks.absorb(hooks);
        } else if self.config.autocommit_hooks {
            hooks.run_commit();
        } else {
            // A dropped commit hook counts as discarded work.
            tracing::debug!(
                dropped = hooks.commit_len(),
                "Discarding hooks registered outside a transaction"
            );
            hooks.run_rollback();
        }
    }

    fn emit(&mut self, event: RowEvent) {
        let listeners = self.signals.listeners_for(&event);
        if listeners.is_empty() {
            return;
        }
        tracing::trace!(
            model = %event.model,
            pk = event.pk,
            signal = ?event.kind.signal(),
            listeners = listeners.len(),
            "Dispatching signal"
        );
        let mut hooks = TxHooks::new();
        for listener in listeners {
            listener(&event, &mut hooks);
        }
        self.absorb_hooks(hooks);
    }

    // ========================================================================
    // Debug Diagnostics
    // ========================================================================

    /// Dump session state for debugging.
    pub fn debug_state(&self) -> SessionDebugInfo {
        SessionDebugInfo {
            tables: self.store.tables.values().filter(|t| !t.is_empty()).count(),
            rows: self.store.tables.values().map(BTreeMap::len).sum(),
            links: self.store.links.values().map(BTreeSet::len).sum(),
            depth: self.frames.len(),
            listeners: self.signals.len(),
        }
    }
}

/// Link-table key and pair for linking `pk` (on `rel.model`) to `other`.
fn link_slot(rel: &RelationshipInfo, pk: i64, other: i64) -> (LinkKey, (i64, i64)) {
    if rel.is_reverse() {
        ((rel.related_model.clone(), rel.field.clone()), (other, pk))
    } else {
        ((rel.model.clone(), rel.field.clone()), (pk, other))
    }
}

fn check_known_columns(meta: &ModelMeta, row: &Row) -> Result<()> {
    for column in row.columns() {
        if !meta.get_field(column).is_some_and(|f| f.is_column()) {
            return Err(Error::UnknownField {
                model: meta.name().to_string(),
                field: column.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{Listener, Signal};
    use nestmodel_core::{FieldInfo, ModelMeta};
    use std::sync::Mutex;

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::from_models([
                ModelMeta::new("Team")
                    .field(FieldInfo::text("name").unique())
                    .field(
                        FieldInfo::many_to_many("powers", "Power")
                            .through("Member")
                            .related_name("teams"),
                    ),
                ModelMeta::new("Hero")
                    .field(FieldInfo::text("name"))
                    .field(
                        FieldInfo::foreign_key("team", "Team")
                            .nullable()
                            .on_delete(ReferentialAction::SetNull),
                    )
                    .field(FieldInfo::many_to_many("powers", "Power")),
                ModelMeta::new("Power").field(FieldInfo::text("name")),
                ModelMeta::new("Badge")
                    .field(FieldInfo::foreign_key("hero", "Hero"))
                    .field(
                        FieldInfo::one_to_one("team", "Team")
                            .nullable()
                            .on_delete(ReferentialAction::Restrict),
                    ),
                ModelMeta::new("Member")
                    .field(FieldInfo::foreign_key("team", "Team"))
                    .field(FieldInfo::foreign_key("power", "Power")),
            ])
            .unwrap(),
        )
    }

    fn session() -> Session {
        Session::new(registry())
    }

    fn team(s: &mut Session, name: &str) -> i64 {
        s.insert("Team", Row::new().with("name", name)).unwrap()
    }

    fn hero(s: &mut Session, name: &str, team: Option<i64>) -> i64 {
        s.insert("Hero", Row::new().with("name", name).with("team", team))
            .unwrap()
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.enforce_foreign_keys);
        assert!(config.autocommit_hooks);
    }

    #[test]
    fn test_insert_assigns_max_plus_one() {
        let mut s = session();
        assert_eq!(team(&mut s, "a"), 1);
        s.insert("Team", Row::new().with("id", 7_i64).with("name", "b"))
            .unwrap();
        assert_eq!(team(&mut s, "c"), 8);
        assert_eq!(s.pks("Team"), vec![1, 7, 8]);
    }

    #[test]
    fn test_insert_rejects_explicit_duplicate_pk() {
        let mut s = session();
        team(&mut s, "a");
        let err = s
            .insert("Team", Row::new().with("id", 1_i64).with("name", "b"))
            .unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn test_constraints_checked() {
        let mut s = session();
        team(&mut s, "a");

        let not_null = s.insert("Hero", Row::new()).unwrap_err();
        assert!(not_null.to_string().contains("NOT NULL"));

        let unique = s.insert("Team", Row::new().with("name", "a")).unwrap_err();
        assert!(unique.to_string().contains("UNIQUE"));

        let fk = s
            .insert("Hero", Row::new().with("name", "x").with("team", 99_i64))
            .unwrap_err();
        assert!(fk.to_string().contains("FOREIGN KEY"));

        let unknown = s.insert("Team", Row::new().with("nope", 1_i64)).unwrap_err();
        assert!(matches!(unknown, Error::UnknownField { .. }));
        assert_eq!(s.count("Hero"), 0);
    }

    #[test]
    fn test_foreign_keys_can_be_unchecked() {
        let mut s = Session::with_config(
            registry(),
            SessionConfig::default().enforce_foreign_keys(false),
        );
        assert!(
            s.insert("Hero", Row::new().with("name", "x").with("team", 99_i64))
                .is_ok()
        );
    }

    #[test]
    fn test_update_merges_and_keeps_pk() {
        let mut s = session();
        let t = team(&mut s, "a");
        let h = hero(&mut s, "x", None);
        s.update("Hero", h, Row::new().with("team", t)).unwrap();
        assert_eq!(s.require("Hero", h).unwrap().get_i64("team"), Some(t));
        assert!(s.update("Hero", h, Row::new().with("id", 5_i64)).is_err());
        assert!(matches!(
            s.update("Hero", 42, Row::new()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_policies() {
        let mut s = session();
        let t = team(&mut s, "a");
        let h = hero(&mut s, "x", Some(t));
        let b = s.insert("Badge", Row::new().with("hero", h)).unwrap();

        // SET NULL on Hero.team
        s.delete("Team", t).unwrap();
        assert!(s.require("Hero", h).unwrap().get("team").unwrap().is_null());

        // CASCADE on Badge.hero
        s.delete("Hero", h).unwrap();
        assert!(!s.exists("Badge", b));
    }

    #[test]
    fn test_restrict_leaves_state_unchanged() {
        let mut s = session();
        let t = team(&mut s, "a");
        let h = hero(&mut s, "x", Some(t));
        s.insert("Badge", Row::new().with("hero", h).with("team", t))
            .unwrap();

        let err = s.delete("Team", t).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert!(s.exists("Team", t));
        assert_eq!(s.require("Hero", h).unwrap().get_i64("team"), Some(t));
    }

    #[test]
    fn test_links_both_directions() {
        let mut s = session();
        let h = hero(&mut s, "x", None);
        let p1 = s.insert("Power", Row::new().with("name", "fly")).unwrap();
        let p2 = s.insert("Power", Row::new().with("name", "swim")).unwrap();

        assert!(s.link("Hero", "powers", h, p2).unwrap());
        assert!(!s.link("Hero", "powers", h, p2).unwrap());
        assert!(s.link("Power", "hero_set", p1, h).unwrap());

        assert_eq!(s.related_pks("Hero", "powers", h).unwrap(), vec![p1, p2]);
        assert_eq!(s.related_pks("Power", "hero_set", p1).unwrap(), vec![h]);

        assert!(s.unlink("Hero", "powers", h, p1).unwrap());
        assert_eq!(s.related_pks("Hero", "powers", h).unwrap(), vec![p2]);

        s.delete("Power", p2).unwrap();
        assert!(s.related_pks("Hero", "powers", h).unwrap().is_empty());
    }

    #[test]
    fn test_through_links_are_derived() {
        let mut s = session();
        let t = team(&mut s, "a");
        let p = s.insert("Power", Row::new().with("name", "fly")).unwrap();
        let m = s
            .insert("Member", Row::new().with("team", t).with("power", p))
            .unwrap();

        assert!(matches!(s.link("Team", "powers", t, p), Err(Error::Config(_))));
        assert_eq!(s.related_pks("Team", "powers", t).unwrap(), vec![p]);
        assert_eq!(s.related_pks("Power", "teams", p).unwrap(), vec![t]);
        assert_eq!(s.related_pks("Team", "member_set", t).unwrap(), vec![m]);

        s.delete("Member", m).unwrap();
        assert!(s.related_pks("Team", "powers", t).unwrap().is_empty());
    }

    #[test]
    fn test_related_pks_single_relations() {
        let mut s = session();
        let t = team(&mut s, "a");
        let h1 = hero(&mut s, "x", Some(t));
        let h2 = hero(&mut s, "y", Some(t));
        let b = s.insert("Badge", Row::new().with("hero", h1).with("team", t)).unwrap();

        assert_eq!(s.related_pks("Hero", "team", h1).unwrap(), vec![t]);
        assert_eq!(s.related_pks("Team", "hero_set", t).unwrap(), vec![h1, h2]);
        assert_eq!(s.related_pks("Team", "badge", t).unwrap(), vec![b]);
        assert!(matches!(
            s.related_pks("Team", "nope", t),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_atomic_rolls_back_rows_and_hooks() {
        let mut s = session();
        let ran = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&ran);
        let result: Result<()> = s.atomic(|s| {
            team(s, "a");
            let log_commit = Arc::clone(&log);
            s.on_commit(move || log_commit.lock().unwrap().push("commit"));
            let log_rollback = Arc::clone(&log);
            s.on_rollback(move || log_rollback.lock().unwrap().push("rollback"));
            Err(Error::integrity("boom"))
        });

        assert!(result.is_err());
        assert_eq!(s.count("Team"), 0);
        assert_eq!(*ran.lock().unwrap(), vec!["rollback"]);
        assert!(!s.in_transaction());
    }

    #[test]
    fn test_nested_atomic_is_a_savepoint() {
        let mut s = session();
        let ran = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&ran);
        s.atomic(|s| {
            team(s, "outer");
            let inner: Result<()> = s.atomic(|s| {
                team(s, "inner");
                let log = Arc::clone(&log);
                s.on_commit(move || log.lock().unwrap().push("inner"));
                Err(Error::integrity("inner failed"))
            });
            assert!(inner.is_err());
            assert!(log.lock().unwrap().is_empty());
            let log = Arc::clone(&log);
            s.on_commit(move || log.lock().unwrap().push("outer"));
            Ok(())
        })
        .unwrap();

        assert_eq!(s.count("Team"), 1);
        assert_eq!(*ran.lock().unwrap(), vec!["outer"]);
    }

    #[test]
    fn test_hooks_run_immediately_outside_transaction() {
        let mut s = session();
        let ran = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&ran);
        s.on_commit(move || *counter.lock().unwrap() += 1);
        assert_eq!(*ran.lock().unwrap(), 1);

        let mut quiet = Session::with_config(
            registry(),
            SessionConfig::default().autocommit_hooks(false),
        );
        let counter = Arc::clone(&ran);
        quiet.on_commit(move || *counter.lock().unwrap() += 1);
        assert_eq!(*ran.lock().unwrap(), 1);
    }

    #[test]
    fn test_discarded_hooks_outside_transaction_roll_back() {
        let mut s = Session::with_config(
            registry(),
            SessionConfig::default().autocommit_hooks(false),
        );
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = TxHooks::new();
        let sink = Arc::clone(&ran);
        hooks.on_commit(move || sink.lock().unwrap().push("commit"));
        let sink = Arc::clone(&ran);
        hooks.on_rollback(move || sink.lock().unwrap().push("rollback"));
        s.absorb_hooks(hooks);
        assert_eq!(*ran.lock().unwrap(), vec!["rollback"]);
    }

    #[test]
    fn test_commit_without_transaction_is_invalid_state() {
        let mut s = session();
        assert!(matches!(s.commit(), Err(Error::InvalidState(_))));
        assert!(matches!(s.rollback(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_signals_reach_listeners_and_defer_hooks() {
        let mut s = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener = Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
            let sink = Arc::clone(&sink);
            let label = format!("{:?}:{}", event.kind.signal(), event.pk);
            hooks.on_commit(move || sink.lock().unwrap().push(label));
        });
        s.signals_mut()
            .connect(Signal::PostSave, "Team", "test-save", Arc::clone(&listener));
        s.signals_mut()
            .connect(Signal::PostDelete, "Team", "test-delete", listener);

        s.atomic(|s| {
            let t = team(s, "a");
            s.update("Team", t, Row::new().with("name", "b"))?;
            s.delete("Team", t)
        })
        .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["PostSave:1", "PostSave:1", "PostDelete:1"]
        );
        assert_eq!(s.debug_state().listeners, 2);
    }

    #[test]
    fn test_m2m_changed_signal() {
        let mut s = session();
        let h = hero(&mut s, "x", None);
        let p = s.insert("Power", Row::new().with("name", "fly")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        s.signals_mut().connect(
            Signal::M2mChanged,
            "Hero",
            "m2m",
            Arc::new(move |event: &RowEvent, _: &mut TxHooks| {
                sink.lock().unwrap().push(event.kind.clone());
            }),
        );
        s.link("Hero", "powers", h, p).unwrap();
        s.unlink("Hero", "powers", h, p).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            &seen[1],
            EventKind::M2mChanged { action: M2mAction::Remove, pk_set, .. } if pk_set == &vec![p]
        ));
    }

    #[test]
    fn test_self_referencing_cascade_terminates() {
        let reg = Arc::new(
            Registry::from_models([ModelMeta::new("Node")
                .field(FieldInfo::foreign_key("parent", "Node").nullable())])
            .unwrap(),
        );
        let mut s = Session::new(reg);
        let a = s.insert("Node", Row::new()).unwrap();
        let b = s.insert("Node", Row::new().with("parent", a)).unwrap();
        s.update("Node", a, Row::new().with("parent", b)).unwrap();

        s.delete("Node", a).unwrap();
        assert_eq!(s.count("Node"), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_auto_pk_follows_max(explicit in prop::collection::btree_set(1_i64..500, 0..20)) {
                let mut s = session();
                for pk in &explicit {
                    s.insert("Power", Row::new().with("id", *pk).with("name", "p")).unwrap();
                }
                let next = s.insert("Power", Row::new().with("name", "auto")).unwrap();
                prop_assert_eq!(next, explicit.iter().max().map_or(1, |m| m + 1));
            }

            #[test]
            fn prop_rollback_restores_row_count(names in prop::collection::vec("[a-z]{1,8}", 0..10)) {
                let mut s = session();
                team(&mut s, "keep");
                let result: Result<()> = s.atomic(|s| {
                    for name in &names {
                        s.insert("Power", Row::new().with("name", name.as_str()))?;
                    }
                    Err(Error::integrity("abort"))
                });
                prop_assert!(result.is_err());
                prop_assert_eq!(s.count("Power"), 0);
                prop_assert_eq!(s.count("Team"), 1);
            }
        }
    }
}
