//! Schema compilation.
//!
//! [`CompiledSchema::compile`] resolves every field of a [`ModelSchema`]
//! against the model registry once. The resulting [`FieldPlan`]s drive
//! validation, persistence and representation; nothing is looked up by name
//! after this point.

use std::sync::Arc;

use nestmodel_core::{
    Error, FieldInfo, FieldKind, ModelMeta, Registry, RelationshipInfo, RelationshipKind, Result,
};

use crate::schema::{FieldSelection, ModelSchema, NestedField, OnRemove};

// ============================================================================
// Field Plans
// ============================================================================

/// How one schema field is read and written.
#[derive(Debug, Clone)]
pub enum PlanKind {
    /// The model's primary key (always read-only).
    Pk,
    /// A stored scalar column.
    Column(FieldInfo),
    /// A relation exposed as a primary key or a list of primary keys.
    PkRelated(RelationshipInfo),
    /// A relation marshalled through a nested schema.
    Nested(NestedPlan),
}

/// Compiled form of a [`NestedField`].
#[derive(Debug, Clone)]
pub struct NestedPlan {
    /// The relation, seen from the parent model.
    pub relation: RelationshipInfo,
    /// Compiled child schema.
    pub schema: Arc<CompiledSchema>,
    /// Accept explicit `null`.
    pub allow_null: bool,
    /// Accept `[]`.
    pub allow_empty: bool,
    /// Policy for rows dropped from the relation on update.
    pub on_remove: OnRemove,
}

/// One resolved schema field.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    /// Key in payloads and representations.
    pub name: String,
    /// Model field or relation accessor it reads and writes.
    pub source: String,
    /// Ignored on input.
    pub read_only: bool,
    /// Must be present on non-partial input.
    pub required: bool,
    /// Resolution.
    pub kind: PlanKind,
}

impl FieldPlan {
    /// The relation behind this field, if any.
    pub fn relation(&self) -> Option<&RelationshipInfo> {
        match &self.kind {
            PlanKind::PkRelated(rel) => Some(rel),
            PlanKind::Nested(nested) => Some(&nested.relation),
            PlanKind::Pk | PlanKind::Column(_) => None,
        }
    }

    /// True for fields whose value is a list.
    pub fn is_many(&self) -> bool {
        self.relation().is_some_and(RelationshipInfo::is_many)
    }
}

// ============================================================================
// Compiled Schema
// ============================================================================

/// A schema resolved against the registry.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    name: String,
    model: String,
    pk_name: String,
    fields: Vec<FieldPlan>,
}

impl CompiledSchema {
    /// Resolve `schema` and every nested schema below it.
    #[tracing::instrument(level = "debug", skip(registry, schema), fields(schema = %schema.name()))]
    pub fn compile(registry: &Registry, schema: &ModelSchema) -> Result<Self> {
        compile_inner(registry, schema, None)
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Primary key column of the bound model.
    pub fn pk_name(&self) -> &str {
        &self.pk_name
    }

    /// Field plans in output order.
    pub fn fields(&self) -> &[FieldPlan] {
        &self.fields
    }

    /// Look up a plan by payload key.
    pub fn field(&self, name: &str) -> Option<&FieldPlan> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Payload keys in output order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

fn compile_inner(
    registry: &Registry,
    schema: &ModelSchema,
    back_field: Option<&str>,
) -> Result<CompiledSchema> {
    let meta = registry.model(schema.model())?;

    for (name, _) in schema.nested_fields() {
        if let FieldSelection::Listed(names) = schema.selection() {
            if !names.iter().any(|n| n == name) {
                return Err(Error::config(format_args!(
                    "nested field `{name}` is declared on `{}` but missing from its field list",
                    schema.name()
                )));
            }
        }
    }

    let mut fields = Vec::new();
    for name in field_names(registry, meta, schema) {
        let mut plan = match schema.nested_field(&name) {
            Some(nested) => nested_plan(registry, schema, &name, nested)?,
            None => model_plan(registry, meta, schema, &name)?,
        };
        if schema.is_read_only(&name) || back_field == Some(plan.source.as_str()) {
            plan.read_only = true;
            plan.required = false;
        }
        fields.push(plan);
    }

    tracing::trace!(
        schema = schema.name(),
        model = meta.name(),
        fields = fields.len(),
        "Compiled schema"
    );

    Ok(CompiledSchema {
        name: schema.name().to_string(),
        model: meta.name().to_string(),
        pk_name: meta.pk_name().to_string(),
        fields,
    })
}

/// Payload keys of the schema, `__all__` expanded.
fn field_names(registry: &Registry, meta: &ModelMeta, schema: &ModelSchema) -> Vec<String> {
    match schema.selection() {
        FieldSelection::Listed(names) => names.clone(),
        FieldSelection::All => {
            let mut names = vec![meta.pk_name().to_string()];
            names.extend(schema.nested_fields().map(|(n, _)| n.to_string()));
            names.extend(
                meta.fields()
                    .iter()
                    .filter(|f| matches!(f.kind, FieldKind::Scalar(_)))
                    .map(|f| f.name.clone()),
            );
            names.extend(
                registry
                    .relationships(meta.name())
                    .into_iter()
                    .filter(|r| !r.is_reverse())
                    .map(|r| r.name),
            );
            let mut seen = std::collections::HashSet::new();
            names.retain(|n| seen.insert(n.clone()));
            names
        }
    }
}

fn nested_plan(
    registry: &Registry,
    schema: &ModelSchema,
    name: &str,
    nested: &NestedField,
) -> Result<FieldPlan> {
    let source = nested.source_name().unwrap_or(name);
    let relation = registry.relation(schema.model(), source).ok_or_else(|| {
        Error::config(format_args!(
            "`{source}` is not a relation of model `{}` (field `{name}` on `{}`)",
            schema.model(),
            schema.name()
        ))
    })?;

    let child = nested.schema();
    if child.model() != relation.related_model {
        return Err(Error::config(format_args!(
            "field `{name}` on `{}` nests `{}` but `{source}` yields `{}`",
            schema.name(),
            child.model(),
            relation.related_model
        )));
    }
    if nested.is_many() != relation.is_many() {
        return Err(Error::config(format_args!(
            "field `{name}` on `{}` must {}be declared with `many`",
            schema.name(),
            if relation.is_many() { "" } else { "not " }
        )));
    }
    if relation.through.is_some() && !nested.is_read_only() {
        return Err(Error::config(format_args!(
            "field `{name}` on `{}` cannot write through-model relation `{source}`; \
             nest the junction rows instead",
            schema.name()
        )));
    }

    let back = relation.is_reverse().then_some(relation.field.as_str());
    let compiled = compile_inner(registry, child, back)?;
    let on_remove = nested
        .removal_policy()
        .unwrap_or_else(|| default_removal(&relation));

    Ok(FieldPlan {
        name: name.to_string(),
        source: source.to_string(),
        read_only: nested.is_read_only(),
        required: nested.is_required() && !nested.is_read_only(),
        kind: PlanKind::Nested(NestedPlan {
            allow_null: nested.allows_null(),
            allow_empty: nested.allows_empty(),
            on_remove,
            schema: Arc::new(compiled),
            relation,
        }),
    })
}

fn default_removal(relation: &RelationshipInfo) -> OnRemove {
    match relation.kind {
        RelationshipKind::ManyToMany => OnRemove::Detach,
        _ if relation.is_remote_column() && !relation.nullable => OnRemove::Delete,
        _ => OnRemove::Detach,
    }
}

fn model_plan(
    registry: &Registry,
    meta: &ModelMeta,
    schema: &ModelSchema,
    name: &str,
) -> Result<FieldPlan> {
    let plan = |read_only: bool, required: bool, kind: PlanKind| FieldPlan {
        name: name.to_string(),
        source: name.to_string(),
        read_only,
        required,
        kind,
    };

    if let Some(field) = meta.get_field(name) {
        let optional = field.nullable || field.default.is_some();
        return Ok(match &field.kind {
            FieldKind::AutoPk => plan(true, false, PlanKind::Pk),
            FieldKind::Scalar(_) => plan(false, !optional, PlanKind::Column(field.clone())),
            FieldKind::ForeignKey(_) | FieldKind::OneToOne(_) | FieldKind::ManyToMany(_) => {
                let relation = registry.relation(meta.name(), name).ok_or_else(|| {
                    Error::config(format_args!("relation `{name}` of `{}` cannot be resolved", meta.name()))
                })?;
                let read_only = relation.through.is_some();
                let required = !read_only && !relation.is_many() && !optional;
                plan(read_only, required, PlanKind::PkRelated(relation))
            }
        });
    }

    if let Some(relation) = registry.relation(meta.name(), name) {
        return Ok(plan(true, false, PlanKind::PkRelated(relation)));
    }

    tracing::debug!(schema = schema.name(), field = name, "Unknown schema field");
    Err(Error::UnknownField {
        model: meta.name().to_string(),
        field: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestmodel_core::{ModelMeta, ReferentialAction};

    fn registry() -> Registry {
        Registry::from_models([
            ModelMeta::new("Team").field(FieldInfo::text("name")),
            ModelMeta::new("Hero")
                .field(FieldInfo::text("name").max_length(20))
                .field(FieldInfo::text("secret").nullable())
                .field(
                    FieldInfo::foreign_key("team", "Team")
                        .nullable()
                        .related_name("heroes")
                        .on_delete(ReferentialAction::SetNull),
                )
                .field(FieldInfo::many_to_many("powers", "Power").related_name("heroes"))
                .field(FieldInfo::many_to_many("gadgets", "Gadget").through("Loan")),
            ModelMeta::new("Power").field(FieldInfo::text("name")),
            ModelMeta::new("Gadget").field(FieldInfo::text("name")),
            ModelMeta::new("Loan")
                .field(FieldInfo::foreign_key("hero", "Hero").related_name("loans"))
                .field(FieldInfo::foreign_key("gadget", "Gadget")),
        ])
        .unwrap()
    }

    fn leaf(model: &str) -> Arc<ModelSchema> {
        Arc::new(ModelSchema::new(format!("{model}Schema"), model).fields(["id", "name"]))
    }

    #[test]
    fn test_all_fields_order() {
        let schema = ModelSchema::new("HeroSchema", "Hero");
        let compiled = CompiledSchema::compile(&registry(), &schema).unwrap();
        let names: Vec<_> = compiled.field_names().collect();
        assert_eq!(names, vec!["id", "name", "secret", "team", "powers", "gadgets"]);

        let gadgets = compiled.field("gadgets").unwrap();
        assert!(gadgets.read_only, "through M2M is read-only");
        assert!(compiled.field("id").unwrap().read_only);
        assert!(compiled.field("name").unwrap().required);
        assert!(!compiled.field("secret").unwrap().required);
        assert!(!compiled.field("team").unwrap().required);
    }

    #[test]
    fn test_declared_nested_comes_after_pk() {
        let schema = ModelSchema::new("TeamSchema", "Team").nested(
            "heroes",
            NestedField::many(Arc::new(ModelSchema::new("HeroSchema", "Hero").fields(["id", "name"]))),
        );
        let compiled = CompiledSchema::compile(&registry(), &schema).unwrap();
        let names: Vec<_> = compiled.field_names().collect();
        assert_eq!(names, vec!["id", "heroes", "name"]);
    }

    #[test]
    fn test_reverse_child_back_field_is_read_only() {
        let hero = Arc::new(ModelSchema::new("HeroSchema", "Hero").fields(["id", "name", "team"]));
        let team = ModelSchema::new("TeamSchema", "Team")
            .fields(["id", "heroes"])
            .nested("heroes", NestedField::many(hero));
        let compiled = CompiledSchema::compile(&registry(), &team).unwrap();
        let PlanKind::Nested(nested) = &compiled.field("heroes").unwrap().kind else {
            panic!("expected nested plan");
        };
        let back = nested.schema.field("team").unwrap();
        assert!(back.read_only);
        assert_eq!(nested.on_remove, OnRemove::Detach);
    }

    #[test]
    fn test_reverse_accessor_in_field_list_is_read_only() {
        let schema = ModelSchema::new("TeamSchema", "Team").fields(["id", "heroes"]);
        let compiled = CompiledSchema::compile(&registry(), &schema).unwrap();
        let heroes = compiled.field("heroes").unwrap();
        assert!(heroes.read_only);
        assert!(heroes.is_many());
    }

    #[test]
    fn test_non_nullable_reverse_fk_defaults_to_delete() {
        let loan = Arc::new(ModelSchema::new("LoanSchema", "Loan").fields(["id", "gadget"]));
        let hero = ModelSchema::new("HeroSchema", "Hero")
            .fields(["id", "loans"])
            .nested("loans", NestedField::many(loan));
        let compiled = CompiledSchema::compile(&registry(), &hero).unwrap();
        let PlanKind::Nested(nested) = &compiled.field("loans").unwrap().kind else {
            panic!("expected nested plan");
        };
        assert_eq!(nested.on_remove, OnRemove::Delete);
        assert!(nested.schema.field("gadget").unwrap().required);
    }

    #[test]
    fn test_config_errors() {
        let registry = registry();

        let unknown = ModelSchema::new("S", "Hero").fields(["id", "nope"]);
        assert!(matches!(
            CompiledSchema::compile(&registry, &unknown),
            Err(Error::UnknownField { .. })
        ));

        let wrong_model = ModelSchema::new("S", "Hero")
            .fields(["id", "team"])
            .nested("team", NestedField::one(leaf("Power")));
        assert!(matches!(CompiledSchema::compile(&registry, &wrong_model), Err(Error::Config(_))));

        let wrong_many = ModelSchema::new("S", "Hero")
            .fields(["id", "team"])
            .nested("team", NestedField::many(leaf("Team")));
        assert!(matches!(CompiledSchema::compile(&registry, &wrong_many), Err(Error::Config(_))));

        let through = ModelSchema::new("S", "Hero")
            .fields(["id", "gadgets"])
            .nested("gadgets", NestedField::many(leaf("Gadget")));
        assert!(matches!(CompiledSchema::compile(&registry, &through), Err(Error::Config(_))));

        let unlisted = ModelSchema::new("S", "Hero")
            .fields(["id"])
            .nested("team", NestedField::one(leaf("Team")));
        assert!(matches!(CompiledSchema::compile(&registry, &unlisted), Err(Error::Config(_))));

        let no_model = ModelSchema::new("S", "Villain");
        assert!(matches!(
            CompiledSchema::compile(&registry, &no_model),
            Err(Error::UnknownModel(_))
        ));
    }

    #[test]
    fn test_source_renames_payload_key() {
        let schema = ModelSchema::new("S", "Hero")
            .fields(["id", "squad"])
            .nested("squad", NestedField::one(leaf("Team")).source("team"));
        let compiled = CompiledSchema::compile(&registry(), &schema).unwrap();
        let squad = compiled.field("squad").unwrap();
        assert_eq!(squad.source, "team");
        assert!(squad.required);
    }
}
