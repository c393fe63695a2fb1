//! # Property-Based Tests
//!
//! Invariants of view rewriting checked with proptest.

use fedgraph_core::{
    Element, ElementFilter, ElementTransformer, Function, GroupMigration, GroupView,
    MigrationConfig, Predicate, RepairScope, SchemaMigration, Value, View,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn migration(scope: RepairScope) -> SchemaMigration {
    SchemaMigration::new(MigrationConfig {
        generation: 2,
        migrations: vec![
            GroupMigration::new("Mapped", &["Mapped", "Copy"])
                .rename("old", &["new"])
                .transform(ElementTransformer::new().select(
                    &["count"],
                    Function::ToLong,
                    &["count"],
                ))
                .scope(scope),
        ],
    })
    .expect("valid mapping")
}

fn group_view(properties: Vec<String>, threshold: i64) -> GroupView {
    GroupView::new()
        .properties(properties)
        .pre_aggregation_filter(
            ElementFilter::new().select(&["count"], Predicate::is_more_than(threshold)),
        )
}

fn raw_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        any::<i64>().prop_map(|v| Some(Value::Long(v))),
        any::<i32>().prop_map(|v| Some(Value::Int(v))),
        any::<i64>().prop_map(|v| Some(Value::String(v.to_string()))),
        "[a-z]{0,6}".prop_map(|s| Some(Value::String(s))),
    ]
}

fn scope() -> impl Strategy<Value = RepairScope> {
    prop_oneof![Just(RepairScope::Property), Just(RepairScope::Element)]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Groups no migration mentions come back exactly as they went in.
    #[test]
    fn unmapped_groups_are_untouched(
        names in vec("[D-L][a-z]{0,5}", 1..6),
        properties in vec("[a-z]{1,4}", 0..5),
        threshold in any::<i64>(),
        scope in scope(),
    ) {
        let mut view = View::new().group("Mapped", group_view(vec!["old".into()], 0));
        for name in &names {
            view = view.group(name.clone(), group_view(properties.clone(), threshold));
        }
        let rewritten = migration(scope).rewrite(&view);
        for name in &names {
            prop_assert_eq!(
                serde_json::to_string(&rewritten.get(name)).expect("json"),
                serde_json::to_string(&view.get(name)).expect("json")
            );
        }
    }

    /// A rewritten filter accepts exactly the raw values whose transformed
    /// form the original filter accepts.
    #[test]
    fn transform_runs_before_the_original_predicate(
        raw in raw_value(),
        threshold in any::<i64>(),
        scope in scope(),
    ) {
        let view = View::new().group("Mapped", group_view(vec![], threshold));
        let rewritten = migration(scope).rewrite(&view);

        let transformed = Function::apply_chain(&[Function::ToLong], raw.clone());
        let expected = transformed
            .as_ref()
            .is_some_and(|v| v.compare(&Value::Long(threshold)) == Some(std::cmp::Ordering::Greater));

        let mut element = Element::edge("Mapped", "a", "b");
        if let Some(value) = raw {
            element = element.with_property("count", value);
        }
        for target in ["Mapped", "Copy"] {
            let filter = &rewritten.get(target).expect("target").pre_aggregation_filter;
            prop_assert_eq!(filter.test(&element), expected);
        }
    }

    /// Renamed requests keep every name that survives plus every target,
    /// with no duplicates.
    #[test]
    fn renamed_properties_are_a_deduplicated_union(
        properties in vec(prop_oneof![Just("old".to_string()), Just("new".to_string()), "[a-c]{1,2}"], 0..8),
    ) {
        let view = View::new().group("Mapped", group_view(properties.clone(), 0));
        let rewritten = migration(RepairScope::Property).rewrite(&view);
        let result = rewritten
            .get("Mapped")
            .and_then(|g| g.properties.clone())
            .expect("properties");

        let unique: BTreeSet<&String> = result.iter().collect();
        prop_assert_eq!(unique.len(), result.len());

        let expected: BTreeSet<String> = properties
            .iter()
            .map(|p| if p == "old" { "new".to_string() } else { p.clone() })
            .collect();
        let actual: BTreeSet<String> = result.into_iter().collect();
        prop_assert_eq!(actual, expected);
    }
}
