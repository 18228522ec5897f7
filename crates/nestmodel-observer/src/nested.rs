//! Nested change observer.
//!
//! A [`NestedModelObserver`] extends the base observer with one route per
//! nested field of the parent's schema: when a child row is saved or deleted,
//! the parent it points at receives a single deduplicated `Update` after the
//! transaction commits.

use std::sync::Arc;

use nestmodel_core::{Error, ModelRef, Registry, Result};
use nestmodel_serializer::ModelSchema;
use nestmodel_session::{Listener, RowEvent, Session, Signal, TxHooks};

use crate::ObserverConfig;
use crate::action::NotificationHandler;
use crate::observer::ModelObserver;

/// Where a child model's changes are routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRoute {
    /// Schema field that nests the child.
    pub field: String,
    /// Child model.
    pub child_model: String,
    /// FK (or one-to-one) on the child pointing at the parent.
    pub fk_field: String,
}

/// Start building a nested observer for `model`.
///
/// The schema is mandatory; passing `None` fails in
/// [`build`](NestedObserverBuilder::build).
pub fn nested_model_observer(
    model: impl Into<String>,
    schema: Option<Arc<ModelSchema>>,
) -> NestedObserverBuilder {
    NestedObserverBuilder {
        model: model.into(),
        schema,
        config: ObserverConfig::default(),
    }
}

/// Builder returned by [`nested_model_observer`].
#[derive(Debug, Clone)]
pub struct NestedObserverBuilder {
    model: String,
    schema: Option<Arc<ModelSchema>>,
    config: ObserverConfig,
}

impl NestedObserverBuilder {
    /// Also observe many-to-many link changes of the parent.
    #[must_use]
    pub fn many_to_many(mut self, value: bool) -> Self {
        self.config.many_to_many = value;
        self
    }

    /// Subscriber partition, see [`ObserverConfig::partition`].
    #[must_use]
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.config.partition = partition.into();
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ObserverConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve child routes and create the observer.
    #[tracing::instrument(level = "debug", skip(self, registry, handler), fields(model = %self.model))]
    pub fn build(
        self,
        registry: &Registry,
        handler: impl NotificationHandler,
    ) -> Result<NestedModelObserver> {
        let schema = self.schema.ok_or_else(|| {
            Error::config(format_args!(
                "a schema must be provided for the nested observer of `{}`",
                self.model
            ))
        })?;
        if schema.model() != self.model {
            return Err(Error::config(format_args!(
                "schema `{}` is bound to `{}`, not `{}`",
                schema.name(),
                schema.model(),
                self.model
            )));
        }

        let routes = discover_routes(registry, &self.model, &schema)?;
        let base = ModelObserver::new(registry, self.model, self.config, handler)?;
        tracing::info!(
            observer = base.id(),
            model = base.model(),
            routes = routes.len(),
            "Built nested observer"
        );
        Ok(NestedModelObserver { base, routes })
    }
}

/// Find, for every nested field, the first FK on the child pointing at the
/// parent. Children without one are skipped.
fn discover_routes(registry: &Registry, parent: &str, schema: &ModelSchema) -> Result<Vec<ChildRoute>> {
    let mut routes: Vec<ChildRoute> = Vec::new();
    for (field, nested) in schema.nested_fields() {
        let child_model = nested.schema().model();
        let child = registry.model(child_model)?;
        let Some(fk) = child.foreign_keys_to(parent).next() else {
            tracing::debug!(field, child = child_model, "Nested child has no FK to parent; skipped");
            continue;
        };
        if routes.iter().any(|r| r.child_model == child_model) {
            continue;
        }
        routes.push(ChildRoute {
            field: field.to_string(),
            child_model: child_model.to_string(),
            fk_field: fk.name.clone(),
        });
    }
    Ok(routes)
}

/// Observer notifying a parent whenever one of its nested children changes.
#[derive(Debug)]
pub struct NestedModelObserver {
    base: ModelObserver,
    routes: Vec<ChildRoute>,
}

impl NestedModelObserver {
    /// The underlying model observer.
    pub fn base(&self) -> &ModelObserver {
        &self.base
    }

    /// Unique observer id.
    pub fn id(&self) -> u64 {
        self.base.id()
    }

    /// Observed parent model.
    pub fn model(&self) -> &str {
        self.base.model()
    }

    /// Resolved child routes.
    pub fn routes(&self) -> &[ChildRoute] {
        &self.routes
    }

    /// Parents with an update in flight.
    pub fn pending(&self) -> Vec<ModelRef> {
        self.base.pending()
    }

    fn route_uids(&self, route: &ChildRoute) -> (String, String) {
        (
            format!("{}-{}-nested-save", self.id(), route.child_model),
            format!("{}-{}-nested-delete", self.id(), route.child_model),
        )
    }

    /// Register the base listeners plus one save and one delete listener per
    /// child route. Returns how many registrations were added.
    pub fn connect(&self, session: &mut Session) -> usize {
        let mut added = self.base.connect(session);
        for route in &self.routes {
            let (save_uid, delete_uid) = self.route_uids(route);
            let signals = session.signals_mut();
            added += usize::from(signals.connect(
                Signal::PostSave,
                &route.child_model,
                save_uid,
                self.child_listener(route),
            ));
            added += usize::from(signals.connect(
                Signal::PostDelete,
                &route.child_model,
                delete_uid,
                self.child_listener(route),
            ));
        }
        tracing::debug!(observer = self.id(), added, "Connected nested observer");
        added
    }

    /// Remove every registration of this observer.
    pub fn disconnect(&self, session: &mut Session) -> usize {
        let mut removed = self.base.disconnect(session);
        for route in &self.routes {
            let (save_uid, delete_uid) = self.route_uids(route);
            let signals = session.signals_mut();
            removed += usize::from(signals.disconnect(&save_uid));
            removed += usize::from(signals.disconnect(&delete_uid));
        }
        removed
    }

    fn child_listener(&self, route: &ChildRoute) -> Listener {
        let dispatcher = Arc::clone(self.base.dispatcher());
        let parent_model = self.model().to_string();
        let fk_field = route.fk_field.clone();
        Arc::new(move |event: &RowEvent, hooks: &mut TxHooks| {
            if let Some(parent) = event.row.get_i64(&fk_field) {
                dispatcher.schedule_update(hooks, ModelRef::new(&parent_model, parent));
            }
        })
    }
}
