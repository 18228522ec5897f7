//! Persistence of validated trees.
//!
//! [`save_tree`] writes a [`ValidatedObject`] and everything below it inside
//! one `Session::atomic` block. Forward single relations are written before
//! the owning row so their keys can be stored in it; reverse relations and
//! many-to-many links are written after it. Collections are reconciled by set
//! difference: rows linked before the write but absent from the payload are
//! detached or deleted according to the field's removal policy.

use std::collections::BTreeSet;

use nestmodel_core::{ModelRef, RelationshipInfo, RelationshipKind, Result, Row, Value};
use nestmodel_session::Session;

use crate::compile::{CompiledSchema, NestedPlan, PlanKind};
use crate::schema::OnRemove;
use crate::validate::{RelationValue, ValidatedObject};

/// Persist `object` (and its nested relations) atomically.
///
/// `instance` is the row being updated; `None` creates one unless the object
/// itself carries a pk.
#[tracing::instrument(level = "debug", skip(session, schema, object), fields(schema = %schema.name()))]
pub fn save_tree(
    session: &mut Session,
    schema: &CompiledSchema,
    object: &ValidatedObject,
    instance: Option<i64>,
) -> Result<ModelRef> {
    let pk = session.atomic(|s| save_object(s, schema, object, instance, None))?;
    tracing::info!(model = schema.model(), pk, "Saved nested tree");
    Ok(ModelRef::new(schema.model(), pk))
}

/// Save one row and its relations; `parent` forces the FK back to the owner
/// of a reverse relation.
fn save_object(
    session: &mut Session,
    schema: &CompiledSchema,
    object: &ValidatedObject,
    instance: Option<i64>,
    parent: Option<(&str, i64)>,
) -> Result<i64> {
    let mut values = object.values.clone();

    for relation in &object.relations {
        let Some(PlanKind::Nested(nested)) = schema.fields().get(relation.plan).map(|p| &p.kind)
        else {
            continue;
        };
        if !nested.relation.is_local_column() {
            continue;
        }
        let value = match &relation.value {
            RelationValue::One(child) => {
                Value::BigInt(save_object(session, &nested.schema, child, None, None)?)
            }
            RelationValue::Null => Value::Null,
            RelationValue::Many(_) | RelationValue::Pks(_) => continue,
        };
        values.set(&nested.relation.field, value);
    }

    if let Some((column, owner)) = parent {
        values.set(column, owner);
    }

    let pk = match object.pk.or(instance) {
        Some(pk) => {
            tracing::debug!(model = schema.model(), pk, columns = values.len(), "Updating row");
            session.update(schema.model(), pk, values)?;
            pk
        }
        None => {
            let pk = session.insert(schema.model(), values)?;
            tracing::debug!(model = schema.model(), pk, "Created row");
            pk
        }
    };

    for relation in &object.relations {
        let Some(plan) = schema.fields().get(relation.plan) else {
            continue;
        };
        match (&plan.kind, &relation.value) {
            (PlanKind::Nested(nested), value) if !nested.relation.is_local_column() => {
                save_remote(session, schema.model(), pk, nested, value)?;
            }
            (PlanKind::PkRelated(rel), RelationValue::Pks(pks)) => {
                sync_links(session, schema.model(), pk, rel, pks, OnRemove::Detach)?;
            }
            _ => {}
        }
    }

    Ok(pk)
}

/// Reverse relations and many-to-many collections of the row `pk`.
fn save_remote(
    session: &mut Session,
    model: &str,
    pk: i64,
    nested: &NestedPlan,
    value: &RelationValue,
) -> Result<()> {
    let rel = &nested.relation;
    match (rel.kind, value) {
        (RelationshipKind::OneToOne, RelationValue::Null) => {
            for current in session.related_pks(model, &rel.name, pk)? {
                remove(session, rel, nested.on_remove, model, pk, current)?;
            }
        }
        (RelationshipKind::OneToOne, RelationValue::One(child)) => {
            for current in session.related_pks(model, &rel.name, pk)? {
                if child.pk != Some(current) {
                    remove(session, rel, nested.on_remove, model, pk, current)?;
                }
            }
            save_object(session, &nested.schema, child, None, Some((&rel.field, pk)))?;
        }
        (RelationshipKind::OneToMany, RelationValue::Many(items)) => {
            let before = session.related_pks(model, &rel.name, pk)?;
            let mut after = BTreeSet::new();
            for item in items {
                after.insert(save_object(
                    session,
                    &nested.schema,
                    item,
                    None,
                    Some((&rel.field, pk)),
                )?);
            }
            for stale in before.into_iter().filter(|p| !after.contains(p)) {
                remove(session, rel, nested.on_remove, model, pk, stale)?;
            }
        }
        (RelationshipKind::ManyToMany, RelationValue::Many(items)) => {
            let mut pks = Vec::with_capacity(items.len());
            for item in items {
                pks.push(save_object(session, &nested.schema, item, None, None)?);
            }
            sync_links(session, model, pk, rel, &pks, nested.on_remove)?;
        }
        (kind, _) => {
            tracing::trace!(accessor = %rel.name, ?kind, "Relation value does not apply");
        }
    }
    Ok(())
}

/// Make the links of a many-to-many accessor exactly `pks`.
fn sync_links(
    session: &mut Session,
    model: &str,
    pk: i64,
    rel: &RelationshipInfo,
    pks: &[i64],
    on_remove: OnRemove,
) -> Result<()> {
    let before = session.related_pks(model, &rel.name, pk)?;
    let after: BTreeSet<i64> = pks.iter().copied().collect();
    for other in &after {
        session.link(model, &rel.name, pk, *other)?;
    }
    for stale in before.into_iter().filter(|p| !after.contains(p)) {
        remove(session, rel, on_remove, model, pk, stale)?;
    }
    Ok(())
}

/// Drop `child` from the relation `rel` of the row `pk`.
fn remove(
    session: &mut Session,
    rel: &RelationshipInfo,
    policy: OnRemove,
    model: &str,
    pk: i64,
    child: i64,
) -> Result<()> {
    tracing::debug!(
        accessor = %rel.name,
        related = %rel.related_model,
        child,
        ?policy,
        "Removing related row"
    );
    match (rel.kind, policy) {
        (_, OnRemove::Delete) => session.delete(&rel.related_model, child),
        (RelationshipKind::ManyToMany, OnRemove::Detach) => {
            session.unlink(model, &rel.name, pk, child).map(|_| ())
        }
        (_, OnRemove::Detach) => session.update(
            &rel.related_model,
            child,
            Row::new().with(&rel.field, Value::Null),
        ),
    }
}
