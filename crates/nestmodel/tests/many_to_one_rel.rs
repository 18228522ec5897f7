//! Nested reverse foreign keys: a collection of children pointing at the parent.

mod common;

use common::{Fixture, leaf, named};
use nestmodel::prelude::*;
use serde_json::json;

fn fixture(child_nullable: bool) -> Fixture {
    let mut parent = FieldInfo::foreign_key("parent", "Parent").related_name("nested");
    if child_nullable {
        parent = parent.nullable();
    }
    let mut f = Fixture::new(
        [
            ModelMeta::new("Parent"),
            ModelMeta::new("Nested").field(FieldInfo::text("name")).field(parent),
        ],
        ModelSchema::new("ParentSchema", "Parent")
            .fields(["id", "nested"])
            .nested("nested", NestedField::many(leaf("Nested"))),
    );
    f.seed("Parent", 1, Row::new());
    f.seed("Nested", 3, named("three").with("parent", 1_i64));
    f.seed("Nested", 5, named("five").with("parent", 1_i64));
    f
}

fn children(f: &Fixture, parent: i64) -> Vec<i64> {
    f.session.filter("Nested", "parent", &Value::BigInt(parent))
}

#[test]
fn create_with_empty_list_and_without_list() {
    let mut f = fixture(true);
    assert_eq!(f.create(json!({})), json!({"id": 2, "nested": []}));
    assert_eq!(f.create(json!({"nested": []})), json!({"id": 3, "nested": []}));
    assert_eq!(children(&f, 1), vec![3, 5]);
}

#[test]
fn create_mixes_new_and_existing_children() {
    let mut f = fixture(true);
    assert_eq!(
        f.create(json!({"nested": [{"name": "new"}, {"id": 3}, {"id": 5, "name": "patched"}]})),
        json!({"id": 2, "nested": [
            {"id": 3, "name": "three"},
            {"id": 5, "name": "patched"},
            {"id": 6, "name": "new"},
        ]})
    );
    assert!(children(&f, 1).is_empty());
}

#[test]
fn update_without_list_keeps_children() {
    let mut f = fixture(true);
    assert_eq!(
        f.update(1, json!({})),
        json!({"id": 1, "nested": [{"id": 3, "name": "three"}, {"id": 5, "name": "five"}]})
    );
}

#[test]
fn update_with_empty_list_detaches_all() {
    let mut f = fixture(true);
    assert_eq!(f.update(1, json!({"nested": []})), json!({"id": 1, "nested": []}));
    assert_eq!(f.session.count("Nested"), 2);
    assert!(children(&f, 1).is_empty());
}

#[test]
fn update_reconciles_by_set_difference() {
    let mut f = fixture(true);
    assert_eq!(
        f.update(1, json!({"nested": [{"id": 5}, {"name": "new"}]})),
        json!({"id": 1, "nested": [{"id": 5, "name": "five"}, {"id": 6, "name": "new"}]})
    );
    assert_eq!(
        f.session.get("Nested", 3).and_then(|r| r.get("parent")),
        Some(&Value::Null)
    );
}

#[test]
fn update_deletes_children_that_cannot_be_orphaned() {
    let mut f = fixture(false);
    assert_eq!(
        f.update(1, json!({"nested": [{"id": 3}]})),
        json!({"id": 1, "nested": [{"id": 3, "name": "three"}]})
    );
    assert!(!f.session.exists("Nested", 5));
}

#[test]
fn explicit_policy_overrides_default_removal() {
    let mut f = fixture(true);
    f.schema = Arc::new(
        ModelSchema::new("ParentSchema", "Parent")
            .fields(["id", "nested"])
            .nested(
                "nested",
                NestedField::many(leaf("Nested")).on_remove(OnRemove::Delete),
            ),
    );
    f.update(1, json!({"nested": []}));
    assert_eq!(f.session.count("Nested"), 0);
}

#[test]
fn item_errors_are_reported_by_position() {
    let f = fixture(true);
    assert_eq!(
        f.errors(json!({"nested": [{"name": "ok"}, {}, {"id": "x"}]}), Some(1)),
        json!({"nested": [
            {},
            {"name": ["This field is required."]},
            {"id": ["A valid integer is required."]},
        ]})
    );
}

#[test]
fn collection_must_be_a_list() {
    let f = fixture(true);
    assert_eq!(
        f.errors(json!({"nested": {"name": "x"}}), None),
        json!({"nested": ["Expected a list of items but got type \"dict\"."]})
    );
}

#[test]
fn empty_list_can_be_forbidden() {
    let mut f = fixture(true);
    f.schema = Arc::new(
        ModelSchema::new("ParentSchema", "Parent")
            .fields(["id", "nested"])
            .nested("nested", NestedField::many(leaf("Nested")).allow_empty(false)),
    );
    assert_eq!(
        f.errors(json!({"nested": []}), None),
        json!({"nested": ["This list may not be empty."]})
    );
}
