// modrules-core/src/query.rs
//! Questions about a descriptor collection that tooling asks without running
//! a build, e.g. "which modules only show up in editor builds".
use std::collections::{BTreeMap, BTreeSet};

use modrules_common::dependency::{resolve_with, Predicate, Resolution, ResolveOptions};
use modrules_common::error::DescriptorError;
use modrules_common::model::{Descriptor, ModuleId, TargetContext};
use serde::Serialize;
use tracing::warn;

/// For each module, the dependencies that only ever come in through
/// conditional rules requiring `flag` to be on, e.g. editor-only modules for
/// `editorBuild`.
///
/// Works on the rules themselves; no context is evaluated. A rule counts as
/// gated when [`Predicate::requires_flag`] holds for it. Modules that are
/// also unconditional, or that any other rule adds (including rules that
/// need `flag` off), are not reported. Rules with malformed predicates are
/// skipped.
pub fn gated_modules<'a, I>(descriptors: I, flag: &str) -> BTreeMap<ModuleId, BTreeSet<ModuleId>>
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    let mut out = BTreeMap::new();
    for d in descriptors {
        let mut gated = BTreeSet::new();
        let mut elsewhere: BTreeSet<&ModuleId> = d
            .public_dependencies
            .iter()
            .chain(&d.private_dependencies)
            .chain(&d.dynamic_dependencies)
            .collect();
        for rule in &d.conditional_dependencies {
            match Predicate::parse(&rule.predicate) {
                Ok(p) if p.requires_flag(flag) => gated.extend(rule.modules.iter().cloned()),
                Ok(_) => elsewhere.extend(&rule.modules),
                Err(e) => warn!(
                    "[{}] skipping rule with malformed predicate '{}': {}",
                    d.name, rule.predicate, e
                ),
            }
        }
        gated.retain(|m| !elsewhere.contains(m));
        if !gated.is_empty() {
            out.insert(d.name.clone(), gated);
        }
    }
    out
}

/// How one module's resolved dependencies change between two contexts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDiff {
    pub added_public: BTreeSet<ModuleId>,
    pub added_private: BTreeSet<ModuleId>,
    pub removed_public: BTreeSet<ModuleId>,
    pub removed_private: BTreeSet<ModuleId>,
}

impl ContextDiff {
    pub fn is_empty(&self) -> bool {
        self.added_public.is_empty()
            && self.added_private.is_empty()
            && self.removed_public.is_empty()
            && self.removed_private.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    /// Only modules whose dependencies actually change.
    pub modules: BTreeMap<ModuleId, ContextDiff>,
    /// Modules that failed under either context.
    pub errors: BTreeMap<ModuleId, Vec<DescriptorError>>,
}

fn merge_errors(target: &mut BTreeMap<ModuleId, Vec<DescriptorError>>, resolution: Resolution) {
    for (module, errs) in resolution.errors {
        let entry = target.entry(module).or_default();
        for e in errs {
            if !entry.contains(&e) {
                entry.push(e);
            }
        }
    }
}

/// Resolves under `base` and `other` and reports what switching from the
/// first to the second adds or removes.
pub fn diff<'a, I>(
    descriptors: I,
    base: &TargetContext,
    other: &TargetContext,
    options: &ResolveOptions,
) -> DiffReport
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    let descriptors: Vec<&Descriptor> = descriptors.into_iter().collect();
    let before = resolve_with(descriptors.iter().copied(), base, options);
    let after = resolve_with(descriptors.iter().copied(), other, options);

    let mut report = DiffReport::default();
    for (module, old) in &before.resolved {
        let Some(new) = after.resolved.get(module) else {
            continue;
        };
        let change = ContextDiff {
            added_public: new.resolved_public.difference(&old.resolved_public).cloned().collect(),
            added_private: new.resolved_private.difference(&old.resolved_private).cloned().collect(),
            removed_public: old.resolved_public.difference(&new.resolved_public).cloned().collect(),
            removed_private: old.resolved_private.difference(&new.resolved_private).cloned().collect(),
        };
        if !change.is_empty() {
            report.modules.insert(module.clone(), change);
        }
    }
    merge_errors(&mut report.errors, before);
    merge_errors(&mut report.errors, after);
    report
}

#[cfg(test)]
mod tests {
    use modrules_common::model::{ConditionalRule, Visibility};

    use super::*;

    fn asset_dump() -> Descriptor {
        Descriptor::new("AssetDump")
            .with_public(["Core", "Engine"])
            .with_private(["InputCore"])
            .with_rule(ConditionalRule::new(
                "editorBuild == true",
                ["BlueprintGraph", "InputCore"],
                Visibility::Private,
            ))
            .with_rule(ConditionalRule::new(
                "platform == Win64",
                ["WindowsPlatform"],
                Visibility::Private,
            ))
    }

    #[test]
    fn gated_lists_modules_only_added_under_flag() {
        let d = asset_dump();
        let gated = gated_modules([&d], "editorBuild");
        let names: Vec<&str> = gated["AssetDump"].iter().map(ModuleId::as_str).collect();
        assert_eq!(names, vec!["BlueprintGraph"]);
        assert!(gated_modules([&d], "withSteam").is_empty());
    }

    #[test]
    fn gated_ignores_modules_other_rules_also_add() {
        let d = Descriptor::new("M")
            .with_rule(ConditionalRule::new("editorBuild", ["Shared", "UnrealEd"], Visibility::Private))
            .with_rule(ConditionalRule::new("platform == Win64", ["Shared"], Visibility::Private))
            .with_rule(ConditionalRule::new("!editorBuild", ["GameOnly"], Visibility::Private))
            .with_rule(ConditionalRule::new(
                "editorBuild != false && platform == Mac",
                ["MacEditor"],
                Visibility::Public,
            ))
            .with_rule(ConditionalRule::new("editorBuild || withSteam", ["Steam"], Visibility::Private));
        let gated = gated_modules([&d], "editorBuild");
        let names: Vec<&str> = gated["M"].iter().map(ModuleId::as_str).collect();
        assert_eq!(names, vec!["MacEditor", "UnrealEd"]);
    }

    #[test]
    fn diff_reports_editor_additions() {
        let d = asset_dump();
        let game = TargetContext::builder().editor_build(false).build();
        let editor = TargetContext::builder().editor_build(true).build();
        let report = diff([&d], &game, &editor, &ResolveOptions::default());
        let change = &report.modules["AssetDump"];
        let added: Vec<&str> = change.added_private.iter().map(ModuleId::as_str).collect();
        assert_eq!(added, vec!["BlueprintGraph"]);
        assert!(change.removed_private.is_empty());
        assert!(report.errors.is_empty());

        let reverse = diff([&d], &editor, &game, &ResolveOptions::default());
        assert_eq!(reverse.modules["AssetDump"].removed_private.len(), 1);
    }

    #[test]
    fn diff_skips_unchanged_and_keeps_errors_once() {
        let stable = Descriptor::new("Stable").with_public(["Core"]);
        let broken = Descriptor::new("Broken").with_public(["Broken"]);
        let report = diff(
            [&stable, &broken],
            &TargetContext::default(),
            &TargetContext::builder().editor_build(true).build(),
            &ResolveOptions::default(),
        );
        assert!(report.modules.is_empty());
        assert_eq!(report.errors["Broken"].len(), 1);
    }
}
