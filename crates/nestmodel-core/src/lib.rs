//! Core types for NestModel.
//!
//! `nestmodel-core` is the **foundation layer** for the workspace. It defines the
//! data types that the session, the serializer and the observer all share.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Row`, `Value` and `SqlType` describe what a row stores.
//! - **Metadata**: `FieldInfo`, `ModelMeta` and the `Registry` describe models
//!   and derive every relationship (forward and reverse) between them.
//! - **Errors**: `Error` for aborting failures, `ErrorDetail` for the validation
//!   tree reported back to clients.
//!
//! # Who Uses This Crate
//!
//! - `nestmodel-session` stores rows described by `ModelMeta` and enforces the
//!   constraints declared on `FieldInfo`.
//! - `nestmodel-serializer` resolves schema fields through the `Registry`.
//! - `nestmodel-observer` discovers child-to-parent foreign keys from the
//!   `Registry`.
//!
//! Most applications should use the `nestmodel` facade.

pub mod error;
pub mod field;
pub mod model;
pub mod relationship;
pub mod row;
pub mod types;
pub mod validate;
pub mod value;

pub use error::{Error, ErrorDetail, NON_FIELD_ERRORS, Result};
pub use field::{FieldInfo, FieldKind, ForeignKeyInfo, ManyToManyInfo, ReferentialAction};
pub use model::{ModelMeta, ModelRef, ReferencingField, Registry};
pub use relationship::{
    Direction, RelationshipInfo, RelationshipKind, ThroughInfo, reverse_accessor_name,
};
pub use row::Row;
pub use types::SqlType;
pub use validate::{matches_pattern, validate_column, validate_pattern};
pub use value::{Value, json_type_name};
