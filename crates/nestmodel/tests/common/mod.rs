#![allow(dead_code)]

use nestmodel::prelude::*;
use serde_json::Value as Json;

/// A registry, a session and the schema under test.
pub struct Fixture {
    pub registry: Arc<Registry>,
    pub session: Session,
    pub schema: Arc<ModelSchema>,
}

impl Fixture {
    pub fn new(models: impl IntoIterator<Item = ModelMeta>, schema: ModelSchema) -> Self {
        let registry = Arc::new(Registry::from_models(models).expect("valid registry"));
        let session = Session::new(Arc::clone(&registry));
        Self {
            registry,
            session,
            schema: Arc::new(schema),
        }
    }

    /// Insert a row with an explicit pk.
    pub fn seed(&mut self, model: &str, pk: i64, row: Row) -> i64 {
        self.session
            .insert(model, row.with("id", pk))
            .expect("seed row")
    }

    pub fn serializer(&self) -> NestedModelSerializer {
        NestedModelSerializer::new(&self.registry, Arc::clone(&self.schema)).expect("schema compiles")
    }

    /// Validate, save and re-serialize.
    pub fn save(&mut self, data: Json, instance: Option<i64>) -> Json {
        let mut serializer = self.serializer().with_data(data);
        if let Some(pk) = instance {
            serializer = serializer.with_instance(pk);
        }
        assert!(
            serializer.is_valid(&self.session),
            "unexpected errors: {}",
            serde_json::to_string(&serializer.errors()).unwrap()
        );
        let saved = serializer.save(&mut self.session).expect("save");
        self.represent(saved.pk)
    }

    pub fn create(&mut self, data: Json) -> Json {
        self.save(data, None)
    }

    pub fn update(&mut self, pk: i64, data: Json) -> Json {
        self.save(data, Some(pk))
    }

    /// Validate and return the error tree as JSON; panics if valid.
    pub fn errors(&self, data: Json, instance: Option<i64>) -> Json {
        let mut serializer = self.serializer().with_data(data);
        if let Some(pk) = instance {
            serializer = serializer.with_instance(pk);
        }
        assert!(!serializer.is_valid(&self.session), "payload unexpectedly valid");
        serde_json::to_value(serializer.errors()).unwrap()
    }

    pub fn is_valid(&self, data: Json) -> bool {
        self.serializer().with_data(data).is_valid(&self.session)
    }

    pub fn represent(&self, pk: i64) -> Json {
        self.serializer()
            .to_representation(&self.session, pk)
            .expect("representation")
    }

    pub fn name_of(&self, model: &str, pk: i64) -> Option<String> {
        self.session
            .get(model, pk)
            .and_then(|row| row.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// `{"id", "name"}` schema for a leaf model.
pub fn leaf(model: &str) -> Arc<ModelSchema> {
    Arc::new(ModelSchema::new(format!("{model}Schema"), model).fields(["id", "name"]))
}

/// `{"id"}` schema.
pub fn pk_only(model: &str) -> Arc<ModelSchema> {
    Arc::new(ModelSchema::new(format!("{model}Schema"), model).fields(["id"]))
}

pub fn named(name: &str) -> Row {
    Row::new().with("name", name)
}
