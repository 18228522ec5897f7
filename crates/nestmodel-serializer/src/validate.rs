//! Payload validation.
//!
//! Validation walks the payload alongside the compiled schema and produces
//! either a [`ValidatedObject`] tree ready for persistence or an
//! [`ErrorDetail`] tree shaped like the payload. It only reads the session:
//! existence and uniqueness checks see the state at validation time and are
//! re-checked by the session when the tree is saved.

use std::collections::BTreeMap;

use nestmodel_core::validate::{MSG_NOT_NULL, MSG_REQUIRED};
use nestmodel_core::{
    ErrorDetail, RelationshipInfo, RelationshipKind, Row, SqlType, Value, json_type_name,
    validate_column,
};
use nestmodel_session::Session;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::compile::{CompiledSchema, FieldPlan, NestedPlan, PlanKind};

/// Message for an empty collection where `allow_empty` is false.
pub const MSG_EMPTY_LIST: &str = "This list may not be empty.";

fn invalid_dict(json: &Json) -> String {
    format!(
        "Invalid data. Expected a dictionary, but got {}.",
        json_type_name(json)
    )
}

fn not_a_list(json: &Json) -> String {
    format!(
        "Expected a list of items but got type \"{}\".",
        json_type_name(json)
    )
}

fn does_not_exist(pk: impl std::fmt::Display) -> String {
    format!("Invalid pk \"{pk}\" - object does not exist.")
}

fn incorrect_pk_type(json: &Json) -> String {
    format!(
        "Incorrect type. Expected pk value, received {}.",
        json_type_name(json)
    )
}

// ============================================================================
// Validated Tree
// ============================================================================

/// A validated payload for one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedObject {
    /// Existing row this payload patches; `None` creates a row.
    pub pk: Option<i64>,
    /// Column values keyed by model field name (scalars and FK pks).
    pub values: Row,
    /// Relations written after resolution, in schema order.
    pub relations: Vec<ValidatedRelation>,
}

impl ValidatedObject {
    /// Look up the relation written through `source`.
    pub fn relation(&self, source: &str) -> Option<&RelationValue> {
        self.relations
            .iter()
            .find(|r| r.source == source)
            .map(|r| &r.value)
    }
}

/// One relation of a [`ValidatedObject`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRelation {
    /// Index of the field plan in the compiled schema.
    pub plan: usize,
    /// Accessor on the parent model.
    pub source: String,
    /// What to write.
    pub value: RelationValue,
}

/// Validated value of a relation field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationValue {
    /// Explicit `null` for a single relation.
    Null,
    /// One nested row.
    One(Box<ValidatedObject>),
    /// Nested rows in payload order.
    Many(Vec<ValidatedObject>),
    /// Primary keys of a writable many-to-many field.
    Pks(Vec<i64>),
}

// ============================================================================
// Validator
// ============================================================================

/// Validates payloads against a compiled schema using a read-only session.
pub(crate) struct Validator<'a> {
    session: &'a Session,
    partial: bool,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(session: &'a Session, partial: bool) -> Self {
        Self { session, partial }
    }

    /// Validate a top-level payload; `instance` is the row being updated.
    pub(crate) fn validate(
        &self,
        schema: &CompiledSchema,
        payload: &Json,
        instance: Option<i64>,
    ) -> Result<ValidatedObject, ErrorDetail> {
        let Json::Object(map) = payload else {
            return Err(ErrorDetail::non_field(invalid_dict(payload)));
        };
        self.validate_object(schema, map, instance, self.partial)
    }

    fn validate_object(
        &self,
        schema: &CompiledSchema,
        map: &Map<String, Json>,
        pk: Option<i64>,
        partial: bool,
    ) -> Result<ValidatedObject, ErrorDetail> {
        let mut errors = BTreeMap::new();
        let mut object = ValidatedObject {
            pk,
            ..ValidatedObject::default()
        };

        for (index, plan) in schema.fields().iter().enumerate() {
            if plan.read_only {
                continue;
            }
            let Some(json) = map.get(&plan.name) else {
                if plan.required && !partial {
                    errors.insert(plan.name.clone(), ErrorDetail::message(MSG_REQUIRED));
                }
                continue;
            };

            let outcome = match &plan.kind {
                PlanKind::Pk => Ok(()),
                PlanKind::Column(field) => {
                    let value = Value::from_json(json)
                        .ok_or_else(|| {
                            let ty = field.sql_type().unwrap_or_default();
                            ErrorDetail::message(ty.invalid_message())
                        })
                        .and_then(|v| {
                            validate_column(field, &v).map_err(ErrorDetail::Messages)
                        });
                    value.map(|v| {
                        object.values.set(&plan.source, v);
                    })
                }
                PlanKind::PkRelated(rel) if rel.is_many() => self
                    .related_pk_list(rel, json)
                    .map(|pks| object.relations.push(relation(index, plan, RelationValue::Pks(pks)))),
                PlanKind::PkRelated(rel) => self
                    .related_pk(schema, rel, plan, json, pk)
                    .map(|value| {
                        object.values.set(&plan.source, value);
                    }),
                PlanKind::Nested(nested) if nested.relation.is_many() => self
                    .nested_many(nested, json)
                    .map(|items| object.relations.push(relation(index, plan, RelationValue::Many(items)))),
                PlanKind::Nested(nested) => self
                    .nested_one(schema, nested, json, pk)
                    .map(|value| object.relations.push(relation(index, plan, value))),
            };

            if let Err(detail) = outcome {
                errors.insert(plan.name.clone(), detail);
            }
        }

        if errors.is_empty() {
            Ok(object)
        } else {
            tracing::debug!(schema = schema.name(), fields = errors.len(), "Payload rejected");
            Err(ErrorDetail::Dict(errors))
        }
    }

    // ------------------------------------------------------------------------
    // Primary-key related fields
    // ------------------------------------------------------------------------

    fn related_pk(
        &self,
        schema: &CompiledSchema,
        rel: &RelationshipInfo,
        plan: &FieldPlan,
        json: &Json,
        owner: Option<i64>,
    ) -> Result<Value, ErrorDetail> {
        if json.is_null() {
            return if rel.nullable {
                Ok(Value::Null)
            } else {
                Err(ErrorDetail::message(MSG_NOT_NULL))
            };
        }
        let pk = self.existing_pk(&rel.related_model, json)?;
        if rel.kind == RelationshipKind::OneToOne && !rel.is_reverse() {
            self.check_unbound(schema, &plan.source, pk, owner)?;
        }
        Ok(Value::BigInt(pk))
    }

    fn related_pk_list(&self, rel: &RelationshipInfo, json: &Json) -> Result<Vec<i64>, ErrorDetail> {
        let Json::Array(items) = json else {
            return Err(ErrorDetail::message(not_a_list(json)));
        };
        let mut pks = Vec::with_capacity(items.len());
        for item in items {
            pks.push(self.existing_pk(&rel.related_model, item)?);
        }
        Ok(pks)
    }

    /// Parse a pk and check that the row exists.
    fn existing_pk(&self, model: &str, json: &Json) -> Result<i64, ErrorDetail> {
        let Some(pk) = json.as_i64() else {
            return Err(ErrorDetail::message(incorrect_pk_type(json)));
        };
        if !self.session.exists(model, pk) {
            return Err(ErrorDetail::message(does_not_exist(pk)));
        }
        Ok(pk)
    }

    /// A forward one-to-one target may only be bound to one owner.
    fn check_unbound(
        &self,
        schema: &CompiledSchema,
        column: &str,
        target: i64,
        owner: Option<i64>,
    ) -> Result<(), ErrorDetail> {
        let bound = self
            .session
            .filter(schema.model(), column, &Value::BigInt(target));
        if bound.iter().any(|pk| Some(*pk) != owner) {
            return Err(ErrorDetail::message(format!(
                "{} with this {column} already exists.",
                schema.model()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Nested fields
    // ------------------------------------------------------------------------

    fn nested_one(
        &self,
        schema: &CompiledSchema,
        nested: &NestedPlan,
        json: &Json,
        owner: Option<i64>,
    ) -> Result<RelationValue, ErrorDetail> {
        if json.is_null() {
            return if nested.allow_null {
                Ok(RelationValue::Null)
            } else {
                Err(ErrorDetail::message(MSG_NOT_NULL))
            };
        }
        let child = self.nested_item(nested, json)?;
        let rel = &nested.relation;
        if let Some(pk) = child.pk {
            if rel.kind == RelationshipKind::OneToOne && !rel.is_reverse() {
                self.check_unbound(schema, &rel.field, pk, owner)?;
            }
        }
        Ok(RelationValue::One(Box::new(child)))
    }

    fn nested_many(
        &self,
        nested: &NestedPlan,
        json: &Json,
    ) -> Result<Vec<ValidatedObject>, ErrorDetail> {
        let Json::Array(items) = json else {
            return Err(ErrorDetail::message(not_a_list(json)));
        };
        if items.is_empty() && !nested.allow_empty {
            return Err(ErrorDetail::message(MSG_EMPTY_LIST));
        }

        let mut objects = Vec::with_capacity(items.len());
        let mut details = Vec::with_capacity(items.len());
        let mut failed = false;
        for item in items {
            match self.nested_item(nested, item) {
                Ok(object) => {
                    objects.push(object);
                    details.push(ErrorDetail::empty());
                }
                Err(detail) => {
                    failed = true;
                    details.push(detail);
                }
            }
        }
        if failed {
            Err(ErrorDetail::List(details))
        } else {
            Ok(objects)
        }
    }

    /// Validate one nested mapping; a payload carrying a pk patches that row.
    fn nested_item(&self, nested: &NestedPlan, json: &Json) -> Result<ValidatedObject, ErrorDetail> {
        let Json::Object(map) = json else {
            return Err(ErrorDetail::non_field(invalid_dict(json)));
        };
        let schema = &nested.schema;
        let pk = match map.get(schema.pk_name()) {
            None | Some(Json::Null) => None,
            Some(raw) => {
                let pk = raw.as_i64().ok_or_else(|| {
                    pk_error(schema, SqlType::BigInt.invalid_message().to_string())
                })?;
                if !self.session.exists(schema.model(), pk) {
                    return Err(pk_error(schema, does_not_exist(pk)));
                }
                Some(pk)
            }
        };
        self.validate_object(schema, map, pk, self.partial || pk.is_some())
    }
}

fn pk_error(schema: &CompiledSchema, msg: String) -> ErrorDetail {
    let mut map = BTreeMap::new();
    map.insert(schema.pk_name().to_string(), ErrorDetail::message(msg));
    ErrorDetail::Dict(map)
}

fn relation(index: usize, plan: &FieldPlan, value: RelationValue) -> ValidatedRelation {
    ValidatedRelation {
        plan: index,
        source: plan.source.clone(),
        value,
    }
}
