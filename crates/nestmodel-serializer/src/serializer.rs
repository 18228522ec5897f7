//! The serializer object.

use std::sync::Arc;

use nestmodel_core::{Error, ErrorDetail, ModelRef, Registry, Result};
use nestmodel_session::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::compile::CompiledSchema;
use crate::reconcile::save_tree;
use crate::represent::to_representation;
use crate::schema::ModelSchema;
use crate::validate::{ValidatedObject, Validator};

// ============================================================================
// Serializer Options
// ============================================================================

/// Options for one serializer run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Skip every required check (PATCH semantics).
    pub partial: bool,
}

impl SerializerOptions {
    /// Enable/disable partial validation.
    #[must_use]
    pub fn partial(mut self, value: bool) -> Self {
        self.partial = value;
        self
    }
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Unvalidated,
    Valid(ValidatedObject),
    Invalid(ErrorDetail),
}

// ============================================================================
// NestedModelSerializer
// ============================================================================

/// Validates nested payloads, reconciles them into the session and
/// re-serializes the persisted graph.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nestmodel_core::{FieldInfo, ModelMeta, Registry};
/// use nestmodel_serializer::{ModelSchema, NestedField, NestedModelSerializer};
/// use nestmodel_session::Session;
/// use serde_json::json;
///
/// let registry = Arc::new(Registry::from_models([
///     ModelMeta::new("Team").field(FieldInfo::text("name")),
///     ModelMeta::new("Hero")
///         .field(FieldInfo::text("name"))
///         .field(FieldInfo::foreign_key("team", "Team")),
/// ]).unwrap());
/// let team = Arc::new(ModelSchema::new("TeamSchema", "Team").fields(["id", "name"]));
/// let hero = Arc::new(
///     ModelSchema::new("HeroSchema", "Hero")
///         .fields(["id", "name", "team"])
///         .nested("team", NestedField::one(team)),
/// );
///
/// let mut session = Session::new(Arc::clone(&registry));
/// let mut serializer = NestedModelSerializer::new(&registry, hero)
///     .unwrap()
///     .with_data(json!({"name": "Rusty-Man", "team": {"name": "Preventers"}}));
/// assert!(serializer.is_valid(&session));
/// serializer.save(&mut session).unwrap();
///
/// assert_eq!(
///     serializer.data(&session).unwrap(),
///     json!({"id": 1, "name": "Rusty-Man", "team": {"id": 1, "name": "Preventers"}})
/// );
/// ```
#[derive(Debug, Clone)]
pub struct NestedModelSerializer {
    schema: Arc<CompiledSchema>,
    options: SerializerOptions,
    data: Option<Json>,
    instance: Option<i64>,
    state: State,
}

impl NestedModelSerializer {
    /// Compile `schema` against the registry.
    pub fn new(registry: &Registry, schema: Arc<ModelSchema>) -> Result<Self> {
        let compiled = CompiledSchema::compile(registry, &schema)?;
        Ok(Self::from_compiled(Arc::new(compiled)))
    }

    /// Reuse an already compiled schema.
    #[must_use]
    pub fn from_compiled(schema: Arc<CompiledSchema>) -> Self {
        Self {
            schema,
            options: SerializerOptions::default(),
            data: None,
            instance: None,
            state: State::Unvalidated,
        }
    }

    /// Payload to validate and save.
    #[must_use]
    pub fn with_data(mut self, data: Json) -> Self {
        self.data = Some(data);
        self.state = State::Unvalidated;
        self
    }

    /// Row to update (or represent).
    #[must_use]
    pub fn with_instance(mut self, pk: i64) -> Self {
        self.instance = Some(pk);
        self
    }

    /// Enable/disable partial validation.
    #[must_use]
    pub fn partial(mut self, value: bool) -> Self {
        self.options.partial = value;
        self
    }

    /// Replace all options.
    #[must_use]
    pub fn with_options(mut self, options: SerializerOptions) -> Self {
        self.options = options;
        self
    }

    /// Compiled schema.
    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    /// Current options.
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Validate a payload without touching serializer state.
    pub fn validate(
        &self,
        session: &Session,
        payload: &Json,
    ) -> std::result::Result<ValidatedObject, ErrorDetail> {
        Validator::new(session, self.options.partial).validate(&self.schema, payload, self.instance)
    }

    /// Validate the payload given with [`with_data`](Self::with_data).
    #[tracing::instrument(level = "debug", skip(self, session), fields(schema = %self.schema.name()))]
    pub fn is_valid(&mut self, session: &Session) -> bool {
        let outcome = match &self.data {
            Some(data) => self.validate(session, data),
            None => Err(ErrorDetail::non_field("No data provided")),
        };
        self.state = match outcome {
            Ok(object) => State::Valid(object),
            Err(detail) => State::Invalid(detail),
        };
        matches!(self.state, State::Valid(_))
    }

    /// Errors of the last validation, if it failed.
    pub fn errors(&self) -> Option<&ErrorDetail> {
        match &self.state {
            State::Invalid(detail) => Some(detail),
            _ => None,
        }
    }

    /// Result of the last validation, if it succeeded.
    pub fn validated_data(&self) -> Option<&ValidatedObject> {
        match &self.state {
            State::Valid(object) => Some(object),
            _ => None,
        }
    }

    /// Persist the validated payload and remember the saved row.
    #[tracing::instrument(level = "debug", skip(self, session), fields(schema = %self.schema.name()))]
    pub fn save(&mut self, session: &mut Session) -> Result<ModelRef> {
        let object = match &self.state {
            State::Valid(object) => object,
            State::Invalid(detail) => return Err(Error::Validation(detail.clone())),
            State::Unvalidated => return Err(Error::InvalidState("call `is_valid` before `save`")),
        };
        let saved = save_tree(session, &self.schema, object, self.instance)?;
        self.instance = Some(saved.pk);
        Ok(saved)
    }

    /// Representation of the instance.
    pub fn data(&self, session: &Session) -> Result<Json> {
        let pk = self
            .instance
            .ok_or(Error::InvalidState("no instance to represent"))?;
        to_representation(session, &self.schema, pk)
    }

    /// Representation of any row of the schema's model.
    pub fn to_representation(&self, session: &Session, pk: i64) -> Result<Json> {
        to_representation(session, &self.schema, pk)
    }

    /// The saved or bound row.
    pub fn instance(&self) -> Option<ModelRef> {
        self.instance.map(|pk| ModelRef::new(self.schema.model(), pk))
    }
}
