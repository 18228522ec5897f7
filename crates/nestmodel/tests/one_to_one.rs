//! Nested forward one-to-one fields.

mod common;

use common::{Fixture, leaf, named};
use nestmodel::prelude::*;
use serde_json::json;

fn fixture() -> Fixture {
    let mut f = Fixture::new(
        [
            ModelMeta::new("Nested").field(FieldInfo::text("name")),
            ModelMeta::new("Parent").field(FieldInfo::one_to_one("nested", "Nested").nullable()),
        ],
        ModelSchema::new("ParentSchema", "Parent")
            .fields(["id", "nested"])
            .nested(
                "nested",
                NestedField::one(leaf("Nested")).required(false).allow_null(true),
            ),
    );
    f.seed("Nested", 3, named("three"));
    f.seed("Nested", 5, named("five"));
    f
}

#[test]
fn create_multiple_parents_with_distinct_children() {
    let mut f = fixture();
    assert_eq!(f.create(json!({})), json!({"id": 1, "nested": null}));
    assert_eq!(f.create(json!({"nested": null})), json!({"id": 2, "nested": null}));
    assert_eq!(
        f.create(json!({"nested": {"name": "new"}})),
        json!({"id": 3, "nested": {"id": 6, "name": "new"}})
    );
    assert_eq!(
        f.create(json!({"nested": {"id": 3}})),
        json!({"id": 4, "nested": {"id": 3, "name": "three"}})
    );
    assert_eq!(
        f.create(json!({"nested": {"id": 5, "name": "patched"}})),
        json!({"id": 5, "nested": {"id": 5, "name": "patched"}})
    );
}

#[test]
fn child_bound_to_another_parent_is_rejected() {
    let mut f = fixture();
    f.create(json!({"nested": {"id": 3}}));
    assert_eq!(
        f.errors(json!({"nested": {"id": 3}}), None),
        json!({"nested": ["Parent with this nested already exists."]})
    );
}

#[test]
fn rebinding_own_child_is_allowed() {
    let mut f = fixture();
    f.seed("Parent", 1, Row::new().with("nested", 3_i64));
    assert_eq!(
        f.update(1, json!({"nested": {"id": 3, "name": "again"}})),
        json!({"id": 1, "nested": {"id": 3, "name": "again"}})
    );
}

#[test]
fn update_replaces_child_without_deleting_old_one() {
    let mut f = fixture();
    f.seed("Parent", 1, Row::new().with("nested", 5_i64));
    assert_eq!(
        f.update(1, json!({"nested": {"name": "fresh"}})),
        json!({"id": 1, "nested": {"id": 6, "name": "fresh"}})
    );
    assert!(f.session.exists("Nested", 5));

    assert_eq!(f.update(1, json!({"nested": null})), json!({"id": 1, "nested": null}));
    assert!(f.session.exists("Nested", 6));
}

#[test]
fn update_moves_to_free_child() {
    let mut f = fixture();
    f.seed("Parent", 1, Row::new().with("nested", 5_i64));
    assert_eq!(
        f.update(1, json!({"nested": {"id": 3}})),
        json!({"id": 1, "nested": {"id": 3, "name": "three"}})
    );
}
