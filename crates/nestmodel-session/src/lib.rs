//! In-memory relational session for NestModel Rust.
//!
//! The [`Session`] is the relational layer the serializer and the observer
//! are written against: tables of rows keyed by integer primary keys, link
//! tables for many-to-many relations, row-level change signals, and nested
//! transactions with commit / rollback hooks.
//!
//! # Design Philosophy
//!
//! - **Explicit ownership**: signals belong to the session, not to a global
//!   dispatch table; listeners are registered and removed by id
//! - **Deferred side effects**: listeners never run user work inline, they
//!   attach hooks to the current transaction
//! - **Transaction safety**: `atomic` restores the exact prior state on error,
//!   nested `atomic` blocks behave as savepoints
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nestmodel_core::{FieldInfo, ModelMeta, Registry, Row};
//! use nestmodel_session::Session;
//!
//! let registry = Registry::from_models([
//!     ModelMeta::new("Team").field(FieldInfo::text("name")),
//!     ModelMeta::new("Hero")
//!         .field(FieldInfo::text("name"))
//!         .field(FieldInfo::foreign_key("team", "Team")),
//! ])
//! .unwrap();
//! let mut session = Session::new(Arc::new(registry));
//!
//! let hero = session
//!     .atomic(|s| {
//!         let team = s.insert("Team", Row::new().with("name", "Preventers"))?;
//!         s.insert("Hero", Row::new().with("name", "Rusty-Man").with("team", team))
//!     })
//!     .unwrap();
//!
//! assert_eq!(session.related_pks("Hero", "team", hero).unwrap(), vec![1]);
//! ```

pub mod hooks;
pub mod session;
pub mod signals;

pub use hooks::{Hook, TxHooks};
pub use session::{Session, SessionDebugInfo};
pub use signals::{EventKind, Listener, M2mAction, RowEvent, Signal, Signals};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether writes must reference existing rows through FK columns.
    pub enforce_foreign_keys: bool,
    /// Whether commit hooks registered outside a transaction run immediately
    /// (otherwise their rollback hooks run instead).
    pub autocommit_hooks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enforce_foreign_keys: true,
            autocommit_hooks: true,
        }
    }
}

impl SessionConfig {
    /// Enable/disable foreign key checks.
    #[must_use]
    pub fn enforce_foreign_keys(mut self, value: bool) -> Self {
        self.enforce_foreign_keys = value;
        self
    }

    /// Enable/disable running hooks outside a transaction.
    #[must_use]
    pub fn autocommit_hooks(mut self, value: bool) -> Self {
        self.autocommit_hooks = value;
        self
    }
}
