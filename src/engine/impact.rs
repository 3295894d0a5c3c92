use std::collections::BTreeSet;

use crate::models::analysis::{DependencyMap, SearchIndex};
use crate::models::bug::{ChangeType, FixSuggestion, ImpactAnalysis, RequiredTest};

/// Impact of `fixes` derived from the import graph alone.
///
/// Two passes:
///   Pass 1: collect the changed files and the symbols they define.
///   Pass 2: add every one-hop importer of a changed file.
pub fn fallback_impact(
    fixes: &[FixSuggestion],
    deps: &DependencyMap,
    index: &SearchIndex,
) -> ImpactAnalysis {
    // --- Pass 1: changed files and their symbols ---
    let mut changed: Vec<&str> = Vec::new();
    let mut deleted: Vec<&str> = Vec::new();
    for change in fixes.iter().flat_map(|f| &f.changes) {
        if change.file.is_empty() || changed.contains(&change.file.as_str()) {
            continue;
        }
        changed.push(&change.file);
        if change.change_type == ChangeType::Delete {
            deleted.push(&change.file);
        }
    }

    let mut functions: Vec<String> = Vec::new();
    let mut components: Vec<String> = Vec::new();
    for path in &changed {
        let Some(entry) = index.files.get(*path) else {
            continue;
        };
        for name in entry.functions.iter().chain(&entry.classes) {
            if !functions.contains(name) {
                functions.push(name.clone());
            }
        }
        for name in &entry.components {
            if !components.contains(name) {
                components.push(name.clone());
            }
        }
    }

    // --- Pass 2: one-hop importers ---
    let changed_set: BTreeSet<&str> = changed.iter().copied().collect();
    let mut importers: Vec<&str> = Vec::new();
    for path in &changed {
        for importer in deps.importers_of(path) {
            if !changed_set.contains(importer) && !importers.contains(&importer) {
                importers.push(importer);
            }
        }
    }

    let mut testing_required = vec![RequiredTest::Unit];
    if !importers.is_empty() {
        testing_required.push(RequiredTest::Integration);
    }
    testing_required.push(RequiredTest::Regression);

    let breaking_changes = deleted
        .iter()
        .filter(|path| !deps.importers_of(path).is_empty())
        .map(|path| format!("{path} is deleted but still imported"))
        .collect();

    let mut deployment_considerations = Vec::new();
    if importers.len() > 5 {
        deployment_considerations.push(format!(
            "{} dependent files; consider a staged rollout",
            importers.len()
        ));
    }

    ImpactAnalysis {
        affected_files: changed
            .iter()
            .chain(importers.iter())
            .map(|s| s.to_string())
            .collect(),
        affected_functions: functions,
        affected_components: components,
        breaking_changes,
        testing_required,
        deployment_considerations,
        rollback_plan: if changed.is_empty() {
            "No file changes proposed; nothing to roll back.".to_string()
        } else {
            format!(
                "Revert the fix commit touching {}; no data migration is involved.",
                changed.join(", ")
            )
        },
    }
}
