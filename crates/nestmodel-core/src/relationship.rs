//! Relationship metadata.
//!
//! Relationships are not declared separately: they are derived by the
//! [`Registry`](crate::model::Registry) from the relation fields of each model.
//! A forward relationship is the field itself; a reverse relationship is the
//! accessor the related model gets for free (`hero_set`, `profile`, ...).

use crate::field::ReferentialAction;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one: `Hero` has one `Profile`.
    OneToOne,
    /// Many-to-one: many `Hero`s belong to one `Team`.
    #[default]
    ManyToOne,
    /// One-to-many: one `Team` has many `Hero`s.
    OneToMany,
    /// Many-to-many: `Hero`s have many `Power`s via a link table.
    ManyToMany,
}

/// Which side of the relation declares the field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// The accessor is the declaring field.
    #[default]
    Forward,
    /// The accessor is the reverse side of a field declared on the related model.
    Reverse,
}

/// Junction model of a many-to-many relationship declared with `through`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughInfo {
    /// Junction model name.
    pub model: String,
    /// FK on the junction pointing at the accessor's own model.
    pub source_field: String,
    /// FK on the junction pointing at the related model.
    pub target_field: String,
}

/// Metadata about a relationship between models, seen from `model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Accessor name on `model`.
    pub name: String,

    /// Model the accessor lives on.
    pub model: String,

    /// Model the accessor yields.
    pub related_model: String,

    /// Kind of relationship, from `model`'s point of view.
    pub kind: RelationshipKind,

    /// Forward (declared here) or reverse (declared on `related_model`).
    pub direction: Direction,

    /// Name of the declaring field.
    ///
    /// Lives on `model` for forward relationships, on `related_model` for
    /// reverse ones.
    pub field: String,

    /// Whether the declaring FK column accepts NULL.
    pub nullable: bool,

    /// ON DELETE of the declaring FK column (none for many-to-many).
    pub on_delete: Option<ReferentialAction>,

    /// Junction model for `through` many-to-many relationships.
    pub through: Option<ThroughInfo>,
}

impl RelationshipInfo {
    /// Create a new forward relationship with required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        related_model: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        let name = name.into();
        Self {
            field: name.clone(),
            name,
            model: model.into(),
            related_model: related_model.into(),
            kind,
            direction: Direction::Forward,
            nullable: false,
            on_delete: None,
            through: None,
        }
    }

    /// Mark as the reverse side of `field` (declared on the related model).
    #[must_use]
    pub fn reverse_of(mut self, field: impl Into<String>) -> Self {
        self.direction = Direction::Reverse;
        self.field = field.into();
        self
    }

    /// Set column nullability.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Set the junction model.
    #[must_use]
    pub fn through(mut self, info: ThroughInfo) -> Self {
        self.through = Some(info);
        self
    }

    /// True if the accessor yields a collection.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(
            self.kind,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany
        )
    }

    /// True for the reverse side of a relation.
    #[must_use]
    pub const fn is_reverse(&self) -> bool {
        matches!(self.direction, Direction::Reverse)
    }

    /// True if the relation value is stored in `model`'s own row.
    #[must_use]
    pub const fn is_local_column(&self) -> bool {
        matches!(self.direction, Direction::Forward)
            && matches!(
                self.kind,
                RelationshipKind::ManyToOne | RelationshipKind::OneToOne
            )
    }

    /// True if the related rows carry an FK pointing at `model`.
    #[must_use]
    pub const fn is_remote_column(&self) -> bool {
        matches!(self.direction, Direction::Reverse)
            && matches!(
                self.kind,
                RelationshipKind::OneToMany | RelationshipKind::OneToOne
            )
    }
}

/// Reverse accessor name for a relation field.
///
/// Explicit `related_name` wins; otherwise `<model>_set` for collections and
/// `<model>` for one-to-one. `"+"` (or any name ending in `+`) hides it.
#[must_use]
pub fn reverse_accessor_name(
    declaring_model: &str,
    related_name: Option<&str>,
    one_to_one: bool,
) -> Option<String> {
    match related_name {
        Some(name) if name.ends_with('+') => None,
        Some(name) => Some(name.to_string()),
        None if one_to_one => Some(declaring_model.to_lowercase()),
        None => Some(format!("{}_set", declaring_model.to_lowercase())),
    }
}
