//! Change observers for NestModel Rust.
//!
//! Observers turn row signals of a [`Session`](nestmodel_session::Session)
//! into notifications delivered after the transaction commits.
//!
//! # Role In The Architecture
//!
//! - **Base wiring**: [`ModelObserver`] notifies `Create` / `Update` /
//!   `Delete` for rows of one model.
//! - **Nested wiring**: [`NestedModelObserver`] additionally routes changes
//!   of nested child rows to a single deduplicated `Update` of their parent.
//! - **Delivery**: a [`NotificationHandler`] (any matching closure) receives
//!   the events; its errors are logged and never reach the writer.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nestmodel_core::{FieldInfo, ModelMeta, ModelRef, Registry, Row};
//! use nestmodel_observer::{Action, NotifyError, nested_model_observer};
//! use nestmodel_serializer::{ModelSchema, NestedField};
//! use nestmodel_session::Session;
//!
//! let registry = Arc::new(Registry::from_models([
//!     ModelMeta::new("Team").field(FieldInfo::text("name")),
//!     ModelMeta::new("Hero")
//!         .field(FieldInfo::text("name"))
//!         .field(FieldInfo::foreign_key("team", "Team").related_name("heroes")),
//! ]).unwrap());
//! let hero = Arc::new(ModelSchema::new("HeroSchema", "Hero").fields(["id", "name"]));
//! let team = Arc::new(
//!     ModelSchema::new("TeamSchema", "Team")
//!         .fields(["id", "name", "heroes"])
//!         .nested("heroes", NestedField::many(hero)),
//! );
//!
//! let observer = nested_model_observer("Team", Some(team))
//!     .build(&registry, |team: &ModelRef, action: Action| -> Result<(), NotifyError> {
//!         println!("{action} {team}");
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let mut session = Session::new(Arc::clone(&registry));
//! observer.connect(&mut session);
//! session.insert("Team", Row::new().with("name", "Preventers")).unwrap();
//! session
//!     .atomic(|s| s.insert("Hero", Row::new().with("name", "Rusty-Man").with("team", 1_i64)))
//!     .unwrap();
//! assert!(observer.pending().is_empty());
//! ```

pub mod action;
pub mod nested;
pub mod observer;

pub use action::{Action, NotificationHandler, NotifyError};
pub use nested::{ChildRoute, NestedModelObserver, NestedObserverBuilder, nested_model_observer};
pub use observer::ModelObserver;

// ============================================================================
// Observer Configuration
// ============================================================================

/// Configuration for observers.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Also treat many-to-many link changes of the model as updates.
    pub many_to_many: bool,
    /// Subscriber partition the notifications belong to.
    ///
    /// Only tagged onto the observer's log records. Routing notifications to
    /// subscriber groups is up to the [`NotificationHandler`], which can close
    /// over whatever partition it needs.
    pub partition: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            many_to_many: false,
            partition: "*".to_string(),
        }
    }
}

impl ObserverConfig {
    /// Enable/disable many-to-many observation.
    #[must_use]
    pub fn many_to_many(mut self, value: bool) -> Self {
        self.many_to_many = value;
        self
    }

    /// Set the partition.
    #[must_use]
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }
}
