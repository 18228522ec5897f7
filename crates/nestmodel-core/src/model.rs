//! Model metadata and the model registry.
//!
//! Models are described at runtime with [`ModelMeta`] (a name plus an ordered
//! list of [`FieldInfo`]s) and collected in a [`Registry`]. The registry is the
//! only place where reverse relationships are known: it scans every model's
//! relation fields and derives the accessor each target model receives.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{FieldInfo, FieldKind};
use crate::relationship::{
    RelationshipInfo, RelationshipKind, ThroughInfo, reverse_accessor_name,
};
use crate::validate::validate_pattern;

/// Identity of a persisted row: model name plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    /// Model name.
    pub model: String,
    /// Primary key.
    pub pk: i64,
}

impl ModelRef {
    /// Create a new reference.
    pub fn new(model: impl Into<String>, pk: i64) -> Self {
        Self {
            model: model.into(),
            pk,
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model, self.pk)
    }
}

/// Runtime description of a model.
///
/// Every model gets an auto-incrementing `id` primary key unless a different
/// [`FieldInfo::pk`] is supplied.
///
/// # Example
///
/// ```
/// use nestmodel_core::{FieldInfo, ModelMeta};
///
/// let hero = ModelMeta::new("Hero")
///     .field(FieldInfo::text("name").max_length(100))
///     .field(FieldInfo::foreign_key("team", "Team").nullable());
///
/// assert_eq!(hero.pk_name(), "id");
/// assert_eq!(hero.fields().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    name: String,
    fields: Vec<FieldInfo>,
    pk: usize,
}

impl ModelMeta {
    /// Create a model with an `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldInfo::pk("id")],
            pk: 0,
        }
    }

    /// Add a field. A primary-key field replaces the current one.
    #[must_use]
    pub fn field(mut self, field: FieldInfo) -> Self {
        if field.is_pk() {
            self.fields[self.pk] = field;
        } else if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields in declaration order (primary key first).
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key field.
    pub fn pk_field(&self) -> &FieldInfo {
        &self.fields[self.pk]
    }

    /// Primary key name.
    pub fn pk_name(&self) -> &str {
        &self.fields[self.pk].name
    }

    /// Fields stored in the row (everything but many-to-many).
    pub fn columns(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_column())
    }

    /// FK and one-to-one fields pointing at `target`, in declaration order.
    pub fn foreign_keys_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a FieldInfo> {
        self.fields
            .iter()
            .filter(move |f| f.foreign_key_info().is_some_and(|fk| fk.target == target))
    }
}

/// A field on some model that references another model's rows.
#[derive(Debug, Clone, Copy)]
pub struct ReferencingField<'a> {
    /// Model declaring the field.
    pub model: &'a str,
    /// The FK, one-to-one or many-to-many field.
    pub field: &'a FieldInfo,
}

/// The set of known models.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: BTreeMap<String, ModelMeta>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every model, then check cross-model references.
    pub fn from_models(models: impl IntoIterator<Item = ModelMeta>) -> Result<Self> {
        let mut registry = Self::new();
        for meta in models {
            registry.register(meta)?;
        }
        registry.check()?;
        Ok(registry)
    }

    /// Register one model.
    ///
    /// Cross-model references are not checked here; call [`Registry::check`]
    /// once every model is registered.
    pub fn register(&mut self, meta: ModelMeta) -> Result<()> {
        if self.models.contains_key(meta.name()) {
            return Err(Error::config(format_args!(
                "model `{}` registered twice",
                meta.name()
            )));
        }
        for field in meta.fields() {
            if let Some(msg) = field.pattern.as_deref().and_then(validate_pattern) {
                return Err(Error::config(format_args!(
                    "{}.{}: {msg}",
                    meta.name(),
                    field.name
                )));
            }
        }
        tracing::debug!(model = meta.name(), fields = meta.fields().len(), "Registered model");
        self.models.insert(meta.name().to_string(), meta);
        Ok(())
    }

    /// Verify relation targets, through models and reverse accessor clashes.
    pub fn check(&self) -> Result<()> {
        for meta in self.models.values() {
            for field in meta.fields() {
                if let Some(target) = field.relation_target() {
                    self.model(target)?;
                }
                if let Some(through) = field.many_to_many_info().and_then(|m| m.through.as_ref()) {
                    let target = field.relation_target().unwrap_or_default();
                    self.resolve_through(through, meta.name(), target)?;
                }
            }
        }
        for meta in self.models.values() {
            let rels = self.relationships(meta.name());
            for (i, rel) in rels.iter().enumerate() {
                if rels[..i].iter().any(|r| r.name == rel.name) {
                    return Err(Error::config(format_args!(
                        "accessor `{}` on `{}` is ambiguous",
                        rel.name,
                        meta.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a model.
    pub fn model(&self, name: &str) -> Result<&ModelMeta> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// True if the model is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// All registered models, ordered by name.
    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.models.values()
    }

    /// Every field in the registry that points at `target`.
    pub fn referencing(&self, target: &str) -> Vec<ReferencingField<'_>> {
        self.models
            .values()
            .flat_map(|meta| {
                meta.fields()
                    .iter()
                    .filter(|f| f.relation_target() == Some(target))
                    .map(|field| ReferencingField {
                        model: meta.name(),
                        field,
                    })
            })
            .collect()
    }

    /// All relationships reachable from `model`: forward fields first, then
    /// reverse accessors.
    pub fn relationships(&self, model: &str) -> Vec<RelationshipInfo> {
        let mut out = Vec::new();
        if let Some(meta) = self.models.get(model) {
            out.extend(
                meta.fields()
                    .iter()
                    .filter_map(|f| self.forward_relationship(meta, f)),
            );
        }
        for other in self.models.values() {
            for field in other.fields() {
                if field.relation_target() == Some(model) {
                    out.extend(self.reverse_relationship(other, field));
                }
            }
        }
        out
    }

    /// Resolve one accessor (forward field or reverse accessor) on `model`.
    pub fn relation(&self, model: &str, accessor: &str) -> Option<RelationshipInfo> {
        self.relationships(model)
            .into_iter()
            .find(|r| r.name == accessor)
    }

    fn forward_relationship(&self, meta: &ModelMeta, field: &FieldInfo) -> Option<RelationshipInfo> {
        let rel = match &field.kind {
            FieldKind::ForeignKey(fk) => {
                RelationshipInfo::new(&field.name, meta.name(), &fk.target, RelationshipKind::ManyToOne)
                    .nullable(field.nullable)
                    .on_delete(fk.on_delete)
            }
            FieldKind::OneToOne(fk) => {
                RelationshipInfo::new(&field.name, meta.name(), &fk.target, RelationshipKind::OneToOne)
                    .nullable(field.nullable)
                    .on_delete(fk.on_delete)
            }
            FieldKind::ManyToMany(m2m) => {
                let mut rel = RelationshipInfo::new(
                    &field.name,
                    meta.name(),
                    &m2m.target,
                    RelationshipKind::ManyToMany,
                );
                if let Some(through) = &m2m.through {
                    rel = rel.through(self.resolve_through(through, meta.name(), &m2m.target).ok()?);
                }
                rel
            }
            FieldKind::AutoPk | FieldKind::Scalar(_) => return None,
        };
        Some(rel)
    }

    fn reverse_relationship(&self, declaring: &ModelMeta, field: &FieldInfo) -> Option<RelationshipInfo> {
        let rel = match &field.kind {
            FieldKind::ForeignKey(fk) => {
                let name = reverse_accessor_name(declaring.name(), fk.related_name.as_deref(), false)?;
                RelationshipInfo::new(name, &fk.target, declaring.name(), RelationshipKind::OneToMany)
                    .reverse_of(&field.name)
                    .nullable(field.nullable)
                    .on_delete(fk.on_delete)
            }
            FieldKind::OneToOne(fk) => {
                let name = reverse_accessor_name(declaring.name(), fk.related_name.as_deref(), true)?;
                RelationshipInfo::new(name, &fk.target, declaring.name(), RelationshipKind::OneToOne)
                    .reverse_of(&field.name)
                    .nullable(field.nullable)
                    .on_delete(fk.on_delete)
            }
            FieldKind::ManyToMany(m2m) => {
                let name = reverse_accessor_name(declaring.name(), m2m.related_name.as_deref(), false)?;
                let mut rel = RelationshipInfo::new(
                    name,
                    &m2m.target,
                    declaring.name(),
                    RelationshipKind::ManyToMany,
                )
                .reverse_of(&field.name);
                if let Some(through) = &m2m.through {
                    rel = rel.through(self.resolve_through(through, &m2m.target, declaring.name()).ok()?);
                }
                rel
            }
            FieldKind::AutoPk | FieldKind::Scalar(_) => return None,
        };
        Some(rel)
    }

    /// Find the junction FKs of `through` for a relation from `source` to `target`.
    pub fn resolve_through(&self, through: &str, source: &str, target: &str) -> Result<ThroughInfo> {
        let meta = self.model(through)?;
        let source_field = meta
            .foreign_keys_to(source)
            .next()
            .ok_or_else(|| {
                Error::config(format_args!("through model `{through}` has no FK to `{source}`"))
            })?;
        let target_field = meta
            .foreign_keys_to(target)
            .find(|f| f.name != source_field.name)
            .ok_or_else(|| {
                Error::config(format_args!("through model `{through}` has no FK to `{target}`"))
            })?;
        Ok(ThroughInfo {
            model: through.to_string(),
            source_field: source_field.name.clone(),
            target_field: target_field.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ReferentialAction;
    use crate::relationship::Direction;

    fn registry() -> Registry {
        Registry::from_models([
            ModelMeta::new("Team").field(FieldInfo::text("name")),
            ModelMeta::new("Hero")
                .field(FieldInfo::text("name"))
                .field(
                    FieldInfo::foreign_key("team", "Team")
                        .nullable()
                        .on_delete(ReferentialAction::SetNull),
                )
                .field(FieldInfo::many_to_many("powers", "Power").through("HeroPower")),
            ModelMeta::new("Power").field(FieldInfo::text("name")),
            ModelMeta::new("HeroPower")
                .field(FieldInfo::foreign_key("hero", "Hero").related_name("+"))
                .field(FieldInfo::foreign_key("power", "Power").related_name("+")),
            ModelMeta::new("Profile").field(FieldInfo::one_to_one("hero", "Hero")),
        ])
        .unwrap()
    }

    #[test]
    fn test_model_meta_default_pk_and_replacement() {
        let meta = ModelMeta::new("Thing")
            .field(FieldInfo::text("name"))
            .field(FieldInfo::text("name").nullable());
        assert_eq!(meta.pk_name(), "id");
        assert_eq!(meta.fields().len(), 2);
        assert!(meta.get_field("name").unwrap().nullable);

        let custom = ModelMeta::new("Thing").field(FieldInfo::pk("code"));
        assert_eq!(custom.pk_name(), "code");
        assert_eq!(custom.fields().len(), 1);
    }

    #[test]
    fn test_reverse_accessors_are_derived() {
        let reg = registry();
        let team_heroes = reg.relation("Team", "hero_set").unwrap();
        assert_eq!(team_heroes.kind, RelationshipKind::OneToMany);
        assert_eq!(team_heroes.direction, Direction::Reverse);
        assert_eq!(team_heroes.field, "team");
        assert!(team_heroes.nullable);

        let profile = reg.relation("Hero", "profile").unwrap();
        assert_eq!(profile.kind, RelationshipKind::OneToOne);
        assert!(profile.is_remote_column());

        assert!(reg.relation("Hero", "heropower_set").is_none());
    }

    #[test]
    fn test_through_resolution_both_directions() {
        let reg = registry();
        let forward = reg.relation("Hero", "powers").unwrap();
        let through = forward.through.unwrap();
        assert_eq!(through.source_field, "hero");
        assert_eq!(through.target_field, "power");

        let reverse = reg.relation("Power", "hero_set").unwrap();
        let through = reverse.through.unwrap();
        assert_eq!(through.source_field, "power");
        assert_eq!(through.target_field, "hero");
    }

    #[test]
    fn test_unknown_target_is_config_error() {
        let err = Registry::from_models([
            ModelMeta::new("Hero").field(FieldInfo::foreign_key("team", "Team")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::UnknownModel(name) if name == "Team"));
    }

    #[test]
    fn test_duplicate_and_bad_pattern_rejected() {
        let mut reg = Registry::new();
        reg.register(ModelMeta::new("A")).unwrap();
        assert!(matches!(reg.register(ModelMeta::new("A")), Err(Error::Config(_))));
        assert!(matches!(
            reg.register(ModelMeta::new("B").field(FieldInfo::text("x").pattern("("))),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_clashing_accessors_rejected() {
        let err = Registry::from_models([
            ModelMeta::new("Team"),
            ModelMeta::new("Hero")
                .field(FieldInfo::foreign_key("a", "Team"))
                .field(FieldInfo::foreign_key("b", "Team")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
