//! Schema declarations.
//!
//! A [`ModelSchema`] ties a schema name to a model and lists the fields it
//! marshals. Fields that are not declared explicitly are resolved against the
//! model metadata when the schema is compiled; nested relations are declared
//! with [`NestedField`].

use std::sync::Arc;

/// Which model fields a schema exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    /// Primary key, declared fields, scalar columns and forward relations.
    All,
    /// Exactly these names, in this order.
    Listed(Vec<String>),
}

/// What happens to a related row that drops out of a relation on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnRemove {
    /// Unlink (many-to-many) or null the foreign key (reverse relations).
    Detach,
    /// Delete the related row.
    Delete,
}

/// A schema field that marshals one related row or a collection of them.
#[derive(Debug, Clone)]
pub struct NestedField {
    schema: Arc<ModelSchema>,
    many: bool,
    required: Option<bool>,
    allow_null: bool,
    allow_empty: bool,
    source: Option<String>,
    read_only: bool,
    on_remove: Option<OnRemove>,
}

impl NestedField {
    /// A single related row (one-to-one or many-to-one, either direction).
    ///
    /// Required by default.
    pub fn one(schema: Arc<ModelSchema>) -> Self {
        Self::new(schema, false)
    }

    /// A collection of related rows (reverse foreign key or many-to-many).
    ///
    /// Optional by default: omitted means empty on create and unchanged on
    /// update.
    pub fn many(schema: Arc<ModelSchema>) -> Self {
        Self::new(schema, true)
    }

    fn new(schema: Arc<ModelSchema>, many: bool) -> Self {
        Self {
            schema,
            many,
            required: None,
            allow_null: false,
            allow_empty: true,
            source: None,
            read_only: false,
            on_remove: None,
        }
    }

    /// Require the field to be present in the payload.
    #[must_use]
    pub fn required(mut self, value: bool) -> Self {
        self.required = Some(value);
        self
    }

    /// Accept an explicit `null` (single relations).
    #[must_use]
    pub fn allow_null(mut self, value: bool) -> Self {
        self.allow_null = value;
        self
    }

    /// Accept an empty list (collections).
    #[must_use]
    pub fn allow_empty(mut self, value: bool) -> Self {
        self.allow_empty = value;
        self
    }

    /// Read and write a differently named relation accessor.
    #[must_use]
    pub fn source(mut self, accessor: impl Into<String>) -> Self {
        self.source = Some(accessor.into());
        self
    }

    /// Represent only; ignore the field on input.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Override what happens to rows dropped from the relation.
    #[must_use]
    pub fn on_remove(mut self, policy: OnRemove) -> Self {
        self.on_remove = Some(policy);
        self
    }

    /// Schema of the related rows.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// True for collections.
    pub fn is_many(&self) -> bool {
        self.many
    }

    /// Effective `required` flag.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(!self.many)
    }

    /// Whether `null` is accepted.
    pub fn allows_null(&self) -> bool {
        self.allow_null
    }

    /// Whether `[]` is accepted.
    pub fn allows_empty(&self) -> bool {
        self.allow_empty
    }

    /// Explicit source accessor, if any.
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether input is ignored.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Removal policy override.
    pub fn removal_policy(&self) -> Option<OnRemove> {
        self.on_remove
    }
}

/// Declarative description of how a model is marshalled.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nestmodel_serializer::{ModelSchema, NestedField};
///
/// let team = Arc::new(ModelSchema::new("TeamSchema", "Team").fields(["id", "name"]));
/// let hero = ModelSchema::new("HeroSchema", "Hero")
///     .fields(["id", "name", "team"])
///     .nested("team", NestedField::one(team).required(false).allow_null(true));
///
/// assert_eq!(hero.nested_fields().count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    model: String,
    selection: FieldSelection,
    nested: Vec<(String, NestedField)>,
    read_only_fields: Vec<String>,
}

impl ModelSchema {
    /// Create a schema for `model` exposing every field (`__all__`).
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            selection: FieldSelection::All,
            nested: Vec::new(),
            read_only_fields: Vec::new(),
        }
    }

    /// Expose exactly these fields, in this order.
    #[must_use]
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = FieldSelection::Listed(names.into_iter().map(Into::into).collect());
        self
    }

    /// Expose every field (`"__all__"`).
    #[must_use]
    pub fn all_fields(mut self) -> Self {
        self.selection = FieldSelection::All;
        self
    }

    /// Declare a nested field. Redeclaring a name replaces it.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, field: NestedField) -> Self {
        let name = name.into();
        if let Some(slot) = self.nested.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = field;
        } else {
            self.nested.push((name, field));
        }
        self
    }

    /// Mark model-derived fields as read-only.
    #[must_use]
    pub fn read_only_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_only_fields
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Schema name (used in logs and errors).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Field selection.
    pub fn selection(&self) -> &FieldSelection {
        &self.selection
    }

    /// Declared nested fields in declaration order.
    pub fn nested_fields(&self) -> impl Iterator<Item = (&str, &NestedField)> {
        self.nested.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Look up a declared nested field.
    pub fn nested_field(&self, name: &str) -> Option<&NestedField> {
        self.nested.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// True if the name was listed in `read_only_fields`.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only_fields.iter().any(|n| n == name)
    }
}
