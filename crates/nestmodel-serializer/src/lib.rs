//! Nested, reconciling model serializers for NestModel Rust.
//!
//! `nestmodel-serializer` maps JSON payloads onto a graph of related rows in a
//! [`Session`](nestmodel_session::Session) and back.
//!
//! # Role In The Architecture
//!
//! - **Declaration**: [`ModelSchema`] and [`NestedField`] describe which fields
//!   of a model are exposed and which relations are nested.
//! - **Compilation**: [`CompiledSchema`] resolves declarations against the
//!   model registry once; configuration mistakes surface here.
//! - **Validation**: payloads become a [`ValidatedObject`] tree or an
//!   [`ErrorDetail`](nestmodel_core::ErrorDetail) tree shaped like the payload.
//! - **Reconciliation**: [`save_tree`] creates, patches, re-points, detaches
//!   and deletes related rows inside one transaction.
//! - **Representation**: [`to_representation`] re-serializes the persisted
//!   graph.
//!
//! [`NestedModelSerializer`] ties these steps together behind the
//! `is_valid` / `save` / `data` surface.

pub mod compile;
pub mod reconcile;
pub mod represent;
pub mod schema;
pub mod serializer;
pub mod validate;

pub use compile::{CompiledSchema, FieldPlan, NestedPlan, PlanKind};
pub use reconcile::save_tree;
pub use represent::to_representation;
pub use schema::{FieldSelection, ModelSchema, NestedField, OnRemove};
pub use serializer::{NestedModelSerializer, SerializerOptions};
pub use validate::{MSG_EMPTY_LIST, RelationValue, ValidatedObject, ValidatedRelation};
