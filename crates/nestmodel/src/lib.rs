//! NestModel Rust: nested, reconciling model serializers and change observers.
//!
//! `nestmodel` is the facade crate. It re-exports the building blocks so
//! applications depend on a single crate:
//!
//! - [`model`]: values, rows, model metadata, the registry and error types.
//! - [`session`]: the transactional row store with signals and commit hooks.
//! - [`serializer`]: schema declaration, validation, reconciliation and
//!   representation of nested payloads.
//! - [`observer`]: notifications for parents whose nested children changed.
//!
//! # Quick Start
//!
//! ```
//! use nestmodel::prelude::*;
//! use serde_json::json;
//!
//! let registry = Arc::new(Registry::from_models([
//!     ModelMeta::new("Team").field(FieldInfo::text("name")),
//!     ModelMeta::new("Hero")
//!         .field(FieldInfo::text("name"))
//!         .field(FieldInfo::foreign_key("team", "Team").nullable().related_name("heroes")),
//! ])?);
//! let hero = Arc::new(ModelSchema::new("HeroSchema", "Hero").fields(["id", "name"]));
//! let team = Arc::new(
//!     ModelSchema::new("TeamSchema", "Team")
//!         .fields(["id", "name", "heroes"])
//!         .nested("heroes", NestedField::many(hero)),
//! );
//!
//! let mut session = Session::new(Arc::clone(&registry));
//! let mut serializer = NestedModelSerializer::new(&registry, team)?
//!     .with_data(json!({"name": "Preventers", "heroes": [{"name": "Rusty-Man"}]}));
//! assert!(serializer.is_valid(&session));
//! serializer.save(&mut session)?;
//!
//! assert_eq!(
//!     serializer.data(&session)?,
//!     json!({"id": 1, "name": "Preventers", "heroes": [{"id": 1, "name": "Rusty-Man"}]})
//! );
//! # Ok::<(), nestmodel::Error>(())
//! ```

pub use nestmodel_core as model;
pub use nestmodel_observer as observer;
pub use nestmodel_serializer as serializer;
pub use nestmodel_session as session;

pub use nestmodel_core::{Error, ErrorDetail, Result};

/// Commonly used types.
pub mod prelude {
    pub use std::sync::Arc;

    pub use nestmodel_core::{
        Error, ErrorDetail, FieldInfo, ModelMeta, ModelRef, NON_FIELD_ERRORS, ReferentialAction,
        Registry, Result, Row, SqlType, Value,
    };
    pub use nestmodel_observer::{
        Action, ModelObserver, NestedModelObserver, NotificationHandler, NotifyError,
        ObserverConfig, nested_model_observer,
    };
    pub use nestmodel_serializer::{
        CompiledSchema, ModelSchema, NestedField, NestedModelSerializer, OnRemove,
        SerializerOptions,
    };
    pub use nestmodel_session::{Session, SessionConfig, TxHooks};
}
