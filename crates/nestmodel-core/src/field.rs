//! Field and column definitions.

use crate::types::SqlType;
use crate::value::Value;

/// Referential action for foreign key constraints (ON DELETE).
///
/// These define what happens to referencing rows when the referenced row is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    NoAction,
    /// Restrict - same as NO ACTION (alias for compatibility).
    Restrict,
    /// Cascade - automatically delete referencing rows.
    #[default]
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a referential action from a string (case-insensitive).
    ///
    /// Returns `None` if the string is not a recognized action.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }

    /// True if deleting the referenced row must fail while references exist.
    #[must_use]
    pub const fn blocks_delete(&self) -> bool {
        matches!(self, ReferentialAction::NoAction | ReferentialAction::Restrict)
    }
}

/// Target of a foreign key or one-to-one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyInfo {
    /// Referenced model name.
    pub target: String,
    /// Reverse accessor name on the target (`"+"` hides it).
    pub related_name: Option<String>,
    /// ON DELETE behavior.
    pub on_delete: ReferentialAction,
}

/// Target of a many-to-many field.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyToManyInfo {
    /// Related model name.
    pub target: String,
    /// Reverse accessor name on the target (`"+"` hides it).
    pub related_name: Option<String>,
    /// Explicit junction model, if any.
    pub through: Option<String>,
}

/// What kind of field this is.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Auto-assigned integer primary key.
    AutoPk,
    /// Plain column.
    Scalar(SqlType),
    /// Many-to-one column.
    ForeignKey(ForeignKeyInfo),
    /// Unique many-to-one column.
    OneToOne(ForeignKeyInfo),
    /// Many-to-many relation (stored in a link table, not in the row).
    ManyToMany(ManyToManyInfo),
}

/// Metadata about a model field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// Field name (also the column name).
    pub name: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the empty string is allowed (text columns).
    pub blank: bool,
    /// Unique constraint (implied for one-to-one).
    pub unique: bool,
    /// Value used when an insert omits the column.
    pub default: Option<Value>,
    /// Maximum text length in characters.
    pub max_length: Option<usize>,
    /// Regex every text value must match.
    pub pattern: Option<String>,
}

impl FieldInfo {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            blank: false,
            unique: false,
            default: None,
            max_length: None,
            pattern: None,
        }
    }

    /// Auto-incrementing integer primary key.
    pub fn pk(name: impl Into<String>) -> Self {
        let mut f = Self::with_kind(name, FieldKind::AutoPk);
        f.unique = true;
        f
    }

    /// Plain column of the given type.
    pub fn scalar(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self::with_kind(name, FieldKind::Scalar(sql_type))
    }

    /// Text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::scalar(name, SqlType::Text)
    }

    /// Foreign key (many-to-one) to `target`.
    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::ForeignKey(ForeignKeyInfo {
                target: target.into(),
                related_name: None,
                on_delete: ReferentialAction::default(),
            }),
        )
    }

    /// One-to-one column to `target`.
    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut f = Self::with_kind(
            name,
            FieldKind::OneToOne(ForeignKeyInfo {
                target: target.into(),
                related_name: None,
                on_delete: ReferentialAction::default(),
            }),
        );
        f.unique = true;
        f
    }

    /// Many-to-many relation to `target`.
    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::ManyToMany(ManyToManyInfo {
                target: target.into(),
                related_name: None,
                through: None,
            }),
        )
    }

    /// Mark as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allow the empty string.
    #[must_use]
    pub fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Add a unique constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Limit text length.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Require text values to match a regex.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the reverse accessor name (relations only).
    #[must_use]
    pub fn related_name(mut self, related_name: impl Into<String>) -> Self {
        let related_name = Some(related_name.into());
        match &mut self.kind {
            FieldKind::ForeignKey(fk) | FieldKind::OneToOne(fk) => fk.related_name = related_name,
            FieldKind::ManyToMany(m2m) => m2m.related_name = related_name,
            FieldKind::AutoPk | FieldKind::Scalar(_) => {}
        }
        self
    }

    /// Set the ON DELETE action (foreign keys only).
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let FieldKind::ForeignKey(fk) | FieldKind::OneToOne(fk) = &mut self.kind {
            fk.on_delete = action;
        }
        self
    }

    /// Route a many-to-many relation through an explicit junction model.
    #[must_use]
    pub fn through(mut self, model: impl Into<String>) -> Self {
        if let FieldKind::ManyToMany(m2m) = &mut self.kind {
            m2m.through = Some(model.into());
        }
        self
    }

    /// True for the primary key.
    #[must_use]
    pub fn is_pk(&self) -> bool {
        matches!(self.kind, FieldKind::AutoPk)
    }

    /// True if the field is stored in the row itself.
    #[must_use]
    pub fn is_column(&self) -> bool {
        !matches!(self.kind, FieldKind::ManyToMany(_))
    }

    /// Foreign-key metadata for FK and one-to-one columns.
    #[must_use]
    pub fn foreign_key_info(&self) -> Option<&ForeignKeyInfo> {
        match &self.kind {
            FieldKind::ForeignKey(fk) | FieldKind::OneToOne(fk) => Some(fk),
            _ => None,
        }
    }

    /// Many-to-many metadata.
    #[must_use]
    pub fn many_to_many_info(&self) -> Option<&ManyToManyInfo> {
        match &self.kind {
            FieldKind::ManyToMany(m2m) => Some(m2m),
            _ => None,
        }
    }

    /// Model this field points at, for relation fields.
    #[must_use]
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::ForeignKey(fk) | FieldKind::OneToOne(fk) => Some(&fk.target),
            FieldKind::ManyToMany(m2m) => Some(&m2m.target),
            FieldKind::AutoPk | FieldKind::Scalar(_) => None,
        }
    }

    /// Scalar column type, if this is a plain column.
    #[must_use]
    pub fn sql_type(&self) -> Option<SqlType> {
        match self.kind {
            FieldKind::Scalar(t) => Some(t),
            FieldKind::AutoPk | FieldKind::ForeignKey(_) | FieldKind::OneToOne(_) => {
                Some(SqlType::BigInt)
            }
            FieldKind::ManyToMany(_) => None,
        }
    }
}
