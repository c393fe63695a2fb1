//! # Schema Migration
//!
//! Rewrites a view written against an older schema generation into one that
//! is valid against the current generation, without changing which elements
//! its filters accept.
//!
//! A migration mapping is a list of `GroupMigration`s. Each one moves an old
//! group onto one or more new groups, optionally renaming properties and
//! compensating for a changed property representation.
//!
//! ## Rewrite Rules
//!
//! For every view group `g`:
//! 1. No migration names `g`: the group is copied unchanged.
//! 2. Otherwise, for each migration of `g` in declaration order and each of
//!    its target groups, a copy of the group definition is:
//!    - renamed (properties, selections and projections)
//!    - repaired so filters see the compensating transform's outputs
//!    - prefixed with the compensating filter adjustment
//!    - written under the target group
//!
//! Unmapped copies are written first; mapped writes follow in view-group
//! order then declaration order, and a later write to the same group
//! replaces an earlier one.
//!
//! Compensating steps always run before the view's own steps.

use crate::context::Context;
use crate::function::{Function, Predicate, Selector};
use crate::hook::GraphHook;
use crate::operation::OperationChain;
use crate::pipeline::{ElementFilter, ElementTransformer, FilterStep, TransformStep};
use crate::schema::Schema;
use crate::view::{GroupView, View, push_unique};
use crate::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// How a compensating transform is folded into filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairScope {
    /// Each predicate over a transformed property is adapted individually.
    /// The transform must rewrite single properties in place.
    #[default]
    Property,
    /// The whole filter is evaluated against a transformed copy of the
    /// element.
    Element,
}

/// One old group moved onto one or more new groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMigration {
    pub from_group: String,
    /// Ordered set of target groups.
    pub to_groups: Vec<String>,
    /// Old property name → new names, in order.
    #[serde(default)]
    pub property_renames: BTreeMap<String, Vec<String>>,
    /// Applied before the view's own transformer; written against the new
    /// property names.
    #[serde(default)]
    pub compensating_transform: Option<ElementTransformer>,
    /// Prepended to the pre-aggregation filter.
    #[serde(default)]
    pub compensating_filter_adjustment: Option<ElementFilter>,
    #[serde(default)]
    pub scope: RepairScope,
}

impl GroupMigration {
    #[must_use]
    pub fn new(from_group: impl Into<String>, to_groups: &[&str]) -> Self {
        Self {
            from_group: from_group.into(),
            to_groups: to_groups.iter().map(|g| (*g).to_string()).collect(),
            property_renames: BTreeMap::new(),
            compensating_transform: None,
            compensating_filter_adjustment: None,
            scope: RepairScope::Property,
        }
    }

    #[must_use]
    pub fn rename(mut self, old: impl Into<String>, new: &[&str]) -> Self {
        self.property_renames
            .insert(old.into(), new.iter().map(|n| (*n).to_string()).collect());
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: ElementTransformer) -> Self {
        self.compensating_transform = Some(transform);
        self
    }

    #[must_use]
    pub fn filter_adjustment(mut self, adjustment: ElementFilter) -> Self {
        self.compensating_filter_adjustment = Some(adjustment);
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: RepairScope) -> Self {
        self.scope = scope;
        self
    }

    fn validate(&self) -> Result<(), GraphError> {
        let context = |message: String| {
            GraphError::Configuration(format!("migration of '{}': {}", self.from_group, message))
        };

        if self.from_group.trim().is_empty() {
            return Err(GraphError::Configuration(
                "migration has an empty fromGroup".to_string(),
            ));
        }
        if self.to_groups.is_empty() {
            return Err(context("toGroups is empty".to_string()));
        }
        if self.to_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(context("toGroups contains an empty group name".to_string()));
        }

        let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
        for (old, targets) in &self.property_renames {
            if targets.is_empty() {
                return Err(context(format!("property '{}' is renamed to nothing", old)));
            }
            for target in targets {
                if target.trim().is_empty() {
                    return Err(context(format!(
                        "property '{}' is renamed to an empty name",
                        old
                    )));
                }
                if target == old {
                    continue;
                }
                if self.property_renames.contains_key(target) {
                    return Err(context(format!(
                        "rename chain: '{}' is renamed to '{}', which is itself renamed",
                        old, target
                    )));
                }
                if let Some(previous) = claimed.insert(target, old) {
                    if previous != old.as_str() {
                        return Err(context(format!(
                            "properties '{}' and '{}' are both renamed to '{}'",
                            previous, old, target
                        )));
                    }
                }
            }
        }

        if let Some(transform) = &self.compensating_transform {
            transform
                .validate()
                .map_err(|e| context(format!("compensating transform: {}", e)))?;
            if self.scope == RepairScope::Property {
                if let Some(step) = transform
                    .steps
                    .iter()
                    .find(|step| step.in_place_property().is_none())
                {
                    return Err(context(format!(
                        "property-scoped compensating transform steps must rewrite one property in place, found {:?} -> {:?}",
                        step.selection, step.projection
                    )));
                }
            }
        }
        Ok(())
    }

    /// The name an old property is read under after migration, when it is
    /// dropped.
    fn replacement(&self, name: &str) -> Option<&str> {
        let targets = self.property_renames.get(name)?;
        if targets.iter().any(|t| t == name) {
            return None;
        }
        targets.first().map(String::as_str)
    }
}

/// A complete migration mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// The schema generation views are migrated to.
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub migrations: Vec<GroupMigration>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// A loaded, validated migration mapping. Immutable after construction.
#[derive(Debug, Clone)]
pub struct SchemaMigration {
    generation: u32,
    migrations: Vec<GroupMigration>,
    /// fromGroup → indices into `migrations`, in declaration order.
    by_group: BTreeMap<String, Vec<usize>>,
}

impl SchemaMigration {
    /// Validate and load a mapping.
    pub fn new(config: MigrationConfig) -> Result<Self, GraphError> {
        let mut by_group: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut migrations = Vec::with_capacity(config.migrations.len());
        for (index, mut migration) in config.migrations.into_iter().enumerate() {
            migration.validate()?;
            let mut targets = Vec::with_capacity(migration.to_groups.len());
            for target in std::mem::take(&mut migration.to_groups) {
                push_unique(&mut targets, target);
            }
            migration.to_groups = targets;
            for new_names in migration.property_renames.values_mut() {
                let mut deduped = Vec::with_capacity(new_names.len());
                for name in std::mem::take(new_names) {
                    push_unique(&mut deduped, name);
                }
                *new_names = deduped;
            }
            by_group
                .entry(migration.from_group.clone())
                .or_default()
                .push(index);
            migrations.push(migration);
        }
        tracing::debug!(
            generation = config.generation,
            migrations = migrations.len(),
            "loaded schema migration"
        );
        Ok(Self {
            generation: config.generation,
            migrations,
            by_group,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let config: MigrationConfig = serde_json::from_str(json)
            .map_err(|e| GraphError::Configuration(format!("invalid migration mapping: {}", e)))?;
        Self::new(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Configuration(format!(
                "cannot read migration mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Target generation.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn migrations(&self) -> &[GroupMigration] {
        &self.migrations
    }

    /// Check every target group exists in the current schema.
    pub fn validate_against(&self, schema: &Schema) -> Result<(), GraphError> {
        for migration in &self.migrations {
            for target in &migration.to_groups {
                if schema.group(target).is_none() {
                    return Err(GraphError::Configuration(format!(
                        "migration of '{}' targets group '{}', which the schema does not declare",
                        migration.from_group, target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether views written at `view_generation` need rewriting for a store
    /// at `store_generation`.
    #[must_use]
    pub fn applies(&self, view_generation: u32, store_generation: u32) -> bool {
        view_generation < self.generation && store_generation >= self.generation
    }

    /// Rewrite a view. The input is not modified.
    #[must_use]
    pub fn rewrite(&self, view: &View) -> View {
        let mut groups: BTreeMap<String, GroupView> = view
            .groups
            .iter()
            .filter(|(group, _)| !self.by_group.contains_key(*group))
            .map(|(group, definition)| (group.clone(), definition.clone()))
            .collect();

        for (group, definition) in &view.groups {
            let Some(indices) = self.by_group.get(group) else {
                continue;
            };
            for migration in indices.iter().filter_map(|&i| self.migrations.get(i)) {
                let migrated = migrate_group(definition, migration);
                for target in &migration.to_groups {
                    groups.insert(target.clone(), migrated.clone());
                }
            }
        }
        View { groups }
    }

    /// Rewrite every view carried by the chain and stamp the target
    /// generation.
    pub fn rewrite_chain(&self, chain: &mut OperationChain) {
        for view in chain.views_mut() {
            *view = self.rewrite(view);
        }
        chain.generation = Some(self.generation);
    }
}

impl<O> GraphHook<O> for SchemaMigration {
    fn name(&self) -> &str {
        "schema-migration"
    }

    /// Rewrites chains written against an older generation. Chains that do
    /// not state a generation are assumed to be old.
    fn pre_execute(&self, chain: &mut OperationChain, context: &Context) -> Result<(), GraphError> {
        if chain.generation.is_none_or(|g| g < self.generation) {
            tracing::debug!(
                correlation_id = %context.correlation_id,
                from = ?chain.generation,
                to = self.generation,
                "migrating operation chain"
            );
            self.rewrite_chain(chain);
        }
        Ok(())
    }
}

// =============================================================================
// GROUP REWRITING
// =============================================================================

fn migrate_group(definition: &GroupView, migration: &GroupMigration) -> GroupView {
    let mut migrated = definition.clone();
    rename_properties(&mut migrated, migration);

    if let Some(transform) = &migration.compensating_transform {
        match migration.scope {
            RepairScope::Property => {
                adapt_filter(&mut migrated.pre_aggregation_filter, transform);
                adapt_filter(&mut migrated.post_aggregation_filter, transform);
            }
            RepairScope::Element => {
                wrap_filter(&mut migrated.pre_aggregation_filter, transform);
                wrap_filter(&mut migrated.post_aggregation_filter, transform);
            }
        }
        migrated.transformer.steps = transform
            .steps
            .iter()
            .cloned()
            .chain(migrated.transformer.steps)
            .collect();
    }

    if let Some(adjustment) = &migration.compensating_filter_adjustment {
        migrated.pre_aggregation_filter.steps = adjustment
            .steps
            .iter()
            .cloned()
            .chain(migrated.pre_aggregation_filter.steps)
            .collect();
    }
    migrated
}

// -----------------------------------------------------------------------------
// Renames
// -----------------------------------------------------------------------------

fn rename_properties(definition: &mut GroupView, migration: &GroupMigration) {
    if migration.property_renames.is_empty() {
        return;
    }
    if let Some(requested) = definition.properties.take() {
        let mut renamed = Vec::with_capacity(requested.len());
        for name in requested {
            match migration.property_renames.get(&name) {
                Some(targets) => {
                    if targets.contains(&name) {
                        push_unique(&mut renamed, name.clone());
                    }
                    for target in targets.iter().filter(|t| **t != name) {
                        push_unique(&mut renamed, target.clone());
                    }
                }
                None => push_unique(&mut renamed, name),
            }
        }
        definition.properties = Some(renamed);
    }
    rename_filter(&mut definition.pre_aggregation_filter, migration);
    rename_filter(&mut definition.post_aggregation_filter, migration);
    rename_transformer(&mut definition.transformer, migration);
}

fn rename_selector(selector: &mut Selector, migration: &GroupMigration) {
    if let Selector::Property(name) = selector {
        if let Some(replacement) = migration.replacement(name) {
            *name = replacement.to_string();
        }
    }
}

fn rename_filter(filter: &mut ElementFilter, migration: &GroupMigration) {
    for step in &mut filter.steps {
        for selector in &mut step.selection {
            rename_selector(selector, migration);
        }
        rename_predicate(&mut step.predicate, migration);
    }
}

fn rename_transformer(transformer: &mut ElementTransformer, migration: &GroupMigration) {
    for step in &mut transformer.steps {
        for selector in &mut step.selection {
            rename_selector(selector, migration);
        }
        for name in &mut step.projection {
            if let Some(replacement) = migration.replacement(name) {
                *name = replacement.to_string();
            }
        }
    }
}

/// Whole-element predicates carry their own pipelines, which name
/// properties too.
fn rename_predicate(predicate: &mut Predicate, migration: &GroupMigration) {
    match predicate {
        Predicate::Not { predicate } | Predicate::Adapted { predicate, .. } => {
            rename_predicate(predicate, migration);
        }
        Predicate::And { predicates } | Predicate::Or { predicates } => {
            for p in predicates {
                rename_predicate(p, migration);
            }
        }
        Predicate::TransformAndFilter {
            transformer,
            filter,
        } => {
            rename_transformer(transformer, migration);
            rename_filter(filter, migration);
        }
        Predicate::IsMoreThan { .. }
        | Predicate::IsLessThan { .. }
        | Predicate::IsEqual { .. }
        | Predicate::IsIn { .. }
        | Predicate::Exists => {}
    }
}

// -----------------------------------------------------------------------------
// Compensation
// -----------------------------------------------------------------------------

/// In-place function chain the transform applies to `property`.
fn functions_for(transform: &ElementTransformer, property: &str) -> Vec<Function> {
    transform
        .steps
        .iter()
        .filter(|step| step.in_place_property() == Some(property))
        .map(|step| step.function.clone())
        .collect()
}

/// Property scope: every predicate sees `T(raw)` for each argument `T`
/// rewrites.
fn adapt_filter(filter: &mut ElementFilter, transform: &ElementTransformer) {
    for step in &mut filter.steps {
        adapt_step(step, transform);
    }
}

fn adapt_step(step: &mut FilterStep, transform: &ElementTransformer) {
    let functions: Vec<Vec<Function>> = step
        .selection
        .iter()
        .map(|selector| match selector {
            Selector::Property(name) => functions_for(transform, name),
            Selector::Element => Vec::new(),
        })
        .collect();

    if step.selection.contains(&Selector::Element) {
        if let Predicate::TransformAndFilter { transformer, .. } = &mut step.predicate {
            prepend(transformer, transform);
        }
    }

    if functions.iter().all(Vec::is_empty) {
        return;
    }
    let original = std::mem::replace(&mut step.predicate, Predicate::Exists);
    step.predicate = Predicate::Adapted {
        functions,
        predicate: Box::new(original),
    };
}

/// Element scope: the whole filter is evaluated against `T(element)`.
fn wrap_filter(filter: &mut ElementFilter, transform: &ElementTransformer) {
    if filter.is_empty() {
        return;
    }
    let original = std::mem::take(filter);
    filter.steps.push(FilterStep::new(
        vec![Selector::Element],
        Predicate::TransformAndFilter {
            transformer: transform.clone(),
            filter: original,
        },
    ));
}

fn prepend(transformer: &mut ElementTransformer, transform: &ElementTransformer) {
    let own: Vec<TransformStep> = std::mem::take(&mut transformer.steps);
    transformer.steps = transform.steps.iter().cloned().chain(own).collect();
}

// =============================================================================
// TESTS
// =============================================================================
