//! # Views
//!
//! A `View` is the declarative shape of a read: which groups come back, which
//! properties they keep, and the filters and transformer applied on the way.
//!
//! Evaluation order for one element:
//! 1. pre-aggregation filter
//! 2. (store-side aggregation)
//! 3. post-aggregation filter
//! 4. transformer, on a copy
//! 5. property projection

use crate::pipeline::{ElementFilter, ElementTransformer};
use crate::schema::Schema;
use crate::{Element, GraphError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// GROUP VIEW
// =============================================================================

/// Per-group view definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    /// Properties to retain, in order. `None` keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "ElementFilter::is_empty")]
    pub pre_aggregation_filter: ElementFilter,
    #[serde(default, skip_serializing_if = "ElementFilter::is_empty")]
    pub post_aggregation_filter: ElementFilter,
    #[serde(default, skip_serializing_if = "ElementTransformer::is_empty")]
    pub transformer: ElementTransformer,
}

impl GroupView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the retained properties. Duplicate names are dropped.
    #[must_use]
    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut retained: Vec<String> = Vec::new();
        for name in names {
            push_unique(&mut retained, name.into());
        }
        self.properties = Some(retained);
        self
    }

    #[must_use]
    pub fn pre_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.pre_aggregation_filter = filter;
        self
    }

    #[must_use]
    pub fn post_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.post_aggregation_filter = filter;
        self
    }

    #[must_use]
    pub fn transformer(mut self, transformer: ElementTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Run the group's pipeline over one element.
    ///
    /// Returns `None` when a filter rejects it; otherwise a transformed,
    /// projected copy. The input is never mutated.
    #[must_use]
    pub fn apply(&self, element: &Element) -> Option<Element> {
        if !self.pre_aggregation_filter.test(element) {
            return None;
        }
        if !self.post_aggregation_filter.test(element) {
            return None;
        }
        let mut shaped = element.clone();
        self.transformer.apply(&mut shaped);
        if let Some(retained) = &self.properties {
            shaped
                .properties_mut()
                .retain(|name, _| retained.iter().any(|r| r == name));
        }
        Some(shaped)
    }
}

pub(crate) fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// Group name → group view. Groups absent from the map are excluded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupView>,
}

impl View {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style group insertion.
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, definition: GroupView) -> Self {
        self.groups.insert(name.into(), definition);
        self
    }

    #[must_use]
    pub fn get(&self, group: &str) -> Option<&GroupView> {
        self.groups.get(group)
    }

    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Shape an element, or drop it.
    #[must_use]
    pub fn apply(&self, element: &Element) -> Option<Element> {
        self.groups
            .get(element.group())
            .and_then(|definition| definition.apply(element))
    }

    /// Check every retained property is resolvable.
    ///
    /// A name resolves when the transformer projects it or, if a schema is
    /// supplied and declares the group, when the group stores it. Groups the
    /// schema does not declare are not checked.
    pub fn validate(&self, schema: Option<&Schema>) -> Result<(), GraphError> {
        for (group, definition) in &self.groups {
            definition.transformer.validate()?;
            let Some(retained) = &definition.properties else {
                continue;
            };
            let projected = definition.transformer.projected_properties();
            for name in retained {
                let stored = match schema {
                    Some(schema) if schema.group(group).is_some() => {
                        schema.property_class(group, name).is_some()
                    }
                    _ => true,
                };
                if !stored && !projected.contains(&name.as_str()) {
                    return Err(GraphError::Validation(format!(
                        "view group '{}' requests property '{}' which is neither stored nor projected",
                        group, name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Function, Predicate};
    use crate::Value;

    fn edge(count: i64) -> Element {
        Element::edge("BasicEdge", "a", "b")
            .with_property("count", count)
            .with_property("label", "x")
    }

    #[test]
    fn groups_outside_the_view_are_excluded() {
        let view = View::new().group("Other", GroupView::new());
        assert!(view.apply(&edge(1)).is_none());
    }

    #[test]
    fn projection_keeps_only_requested_properties() {
        let view = View::new().group("BasicEdge", GroupView::new().properties(["count"]));
        let shaped = view.apply(&edge(1)).expect("kept");
        assert_eq!(shaped.properties().len(), 1);
        assert_eq!(shaped.property("count"), Some(&Value::Long(1)));
    }

    #[test]
    fn filters_run_before_the_transformer() {
        let view = View::new().group(
            "BasicEdge",
            GroupView::new()
                .pre_aggregation_filter(
                    ElementFilter::new().select(&["count"], Predicate::is_more_than(2i64)),
                )
                .transformer(ElementTransformer::new().select(
                    &["count"],
                    Function::SetValue {
                        value: Value::Long(0),
                    },
                    &["count"],
                )),
        );
        assert!(view.apply(&edge(1)).is_none());
        let shaped = view.apply(&edge(3)).expect("kept");
        assert_eq!(shaped.property("count"), Some(&Value::Long(0)));
    }

    #[test]
    fn duplicate_property_names_collapse() {
        let group = GroupView::new().properties(["a", "b", "a"]);
        assert_eq!(group.properties, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn validate_accepts_projected_names_and_rejects_unknown_ones() {
        let schema = Schema::new().edge("BasicEdge", [("count", "long")]);
        let projected = View::new().group(
            "BasicEdge",
            GroupView::new()
                .properties(["count", "label"])
                .transformer(ElementTransformer::new().select(
                    &["count"],
                    Function::ToString,
                    &["label"],
                )),
        );
        assert!(projected.validate(Some(&schema)).is_ok());

        let unknown = View::new().group("BasicEdge", GroupView::new().properties(["missing"]));
        assert!(unknown.validate(Some(&schema)).is_err());
        assert!(unknown.validate(None).is_ok());
    }

    #[test]
    fn validate_skips_groups_the_schema_does_not_declare() {
        let schema = Schema::new().edge("BasicEdge", [("count", "long")]);
        let elsewhere = View::new()
            .group("BasicEdge", GroupView::new().properties(["count"]))
            .group("Person", GroupView::new().properties(["name"]));
        assert!(elsewhere.validate(Some(&schema)).is_ok());
    }

    #[test]
    fn empty_pipelines_are_omitted_from_json() {
        let view = View::new().group("BasicEdge", GroupView::new().properties(["count"]));
        let json = view.to_json().expect("json");
        assert_eq!(json, r#"{"groups":{"BasicEdge":{"properties":["count"]}}}"#);
        assert_eq!(View::from_json(&json).expect("parse"), view);
    }
}
