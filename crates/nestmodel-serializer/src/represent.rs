//! Representation of persisted rows.

use nestmodel_core::Result;
use nestmodel_session::Session;
use serde_json::{Map, Value as Json};

use crate::compile::{CompiledSchema, PlanKind};

/// Serialize the row `pk` of the schema's model, following nested relations.
///
/// Collections are ordered by primary key; an empty collection is `[]` and an
/// absent single relation is `null`.
pub fn to_representation(session: &Session, schema: &CompiledSchema, pk: i64) -> Result<Json> {
    let row = session.require(schema.model(), pk)?;
    let mut out = Map::new();

    for plan in schema.fields() {
        let value = match &plan.kind {
            PlanKind::Pk => Json::from(pk),
            PlanKind::Column(_) => row.get(&plan.source).map_or(Json::Null, |v| v.to_json()),
            PlanKind::PkRelated(rel) => {
                let pks = session.related_pks(schema.model(), &rel.name, pk)?;
                if rel.is_many() {
                    Json::from(pks)
                } else {
                    pks.first().map_or(Json::Null, |p| Json::from(*p))
                }
            }
            PlanKind::Nested(nested) => {
                let pks = session.related_pks(schema.model(), &nested.relation.name, pk)?;
                if nested.relation.is_many() {
                    let items = pks
                        .into_iter()
                        .map(|p| to_representation(session, &nested.schema, p))
                        .collect::<Result<Vec<_>>>()?;
                    Json::Array(items)
                } else {
                    match pks.first() {
                        Some(p) => to_representation(session, &nested.schema, *p)?,
                        None => Json::Null,
                    }
                }
            }
        };
        out.insert(plan.name.clone(), value);
    }

    Ok(Json::Object(out))
}
