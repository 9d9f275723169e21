// modrules-common/src/dependency/resolver.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::predicate::Predicate;
use crate::error::{DescriptorError, DescriptorErrorKind};
use crate::model::{Descriptor, ModuleId, PchUsage, TargetContext, Visibility};

/// What happens when an applying conditional rule puts a module at the
/// opposite visibility of where it already is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// The later rule wins; the move is recorded as an [`OverrideRecord`].
    #[default]
    Override,
    /// The module fails with `ConflictingVisibility`.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub conflict_policy: ConflictPolicy,
}

/// A module moved between public and private by a conditional rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub module: ModuleId,
    pub from: Visibility,
    pub to: Visibility,
    /// Index into `conditionalDependencies` of the rule that won.
    pub rule_index: usize,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDependencySet {
    pub resolved_public: BTreeSet<ModuleId>,
    pub resolved_private: BTreeSet<ModuleId>,
    pub resolved_dynamic: BTreeSet<ModuleId>,
    pub include_paths: Vec<String>,
    pub pch_usage: PchUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRecord>,
}

impl ResolvedDependencySet {
    /// Public and private dependencies together: the link-time edges.
    pub fn linked(&self) -> impl Iterator<Item = &ModuleId> {
        self.resolved_public.iter().chain(&self.resolved_private)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.resolved_public.contains(module)
            || self.resolved_private.contains(module)
            || self.resolved_dynamic.contains(module)
    }

    pub fn set(&self, visibility: Visibility) -> &BTreeSet<ModuleId> {
        match visibility {
            Visibility::Public => &self.resolved_public,
            Visibility::Private => &self.resolved_private,
        }
    }

    fn set_mut(&mut self, visibility: Visibility) -> &mut BTreeSet<ModuleId> {
        match visibility {
            Visibility::Public => &mut self.resolved_public,
            Visibility::Private => &mut self.resolved_private,
        }
    }
}

/// Outcome of resolving a collection of descriptors.
///
/// Every module lands in exactly one of the two maps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved: BTreeMap<ModuleId, ResolvedDependencySet>,
    pub errors: BTreeMap<ModuleId, Vec<DescriptorError>>,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, module: &str) -> Option<&ResolvedDependencySet> {
        self.resolved.get(module)
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn record(
        &mut self,
        module: ModuleId,
        outcome: Result<ResolvedDependencySet, Vec<DescriptorError>>,
    ) {
        match outcome {
            Ok(set) => {
                self.resolved.insert(module, set);
            }
            Err(errs) => {
                self.errors.entry(module).or_default().extend(errs);
            }
        }
    }

    /// Fails every name declared by more than one descriptor.
    ///
    /// Each such name gets a `DuplicateModule` error followed by the
    /// validation errors of all its copies, and is returned so callers can
    /// skip resolving it.
    pub fn record_duplicates<'a, I>(&mut self, descriptors: I) -> BTreeSet<ModuleId>
    where
        I: IntoIterator<Item = &'a Descriptor>,
    {
        let descriptors: Vec<&Descriptor> = descriptors.into_iter().collect();
        let dupes = duplicate_names(descriptors.iter().copied());
        for dupe in &dupes {
            warn!("Module '{}' is declared by more than one descriptor", dupe);
            self.errors.entry(dupe.clone()).or_default().push(DescriptorError::new(
                dupe,
                DescriptorErrorKind::DuplicateModule,
                dupe.as_str(),
            ));
        }
        for copy in descriptors.into_iter().filter(|d| dupes.contains(&d.name)) {
            let entry = self.errors.entry(copy.name.clone()).or_default();
            for e in copy.validate() {
                if !entry.contains(&e) {
                    entry.push(e);
                }
            }
        }
        dupes
    }
}

/// Resolves one descriptor against `context`.
///
/// The descriptor is validated first; any validation error fails the whole
/// module and nothing is returned for it.
pub fn resolve_descriptor(
    descriptor: &Descriptor,
    context: &TargetContext,
    options: &ResolveOptions,
) -> Result<ResolvedDependencySet, Vec<DescriptorError>> {
    let errors = descriptor.validate();
    if !errors.is_empty() {
        debug!(
            "Descriptor '{}' failed validation with {} error(s)",
            descriptor.name,
            errors.len()
        );
        return Err(errors);
    }

    let name = &descriptor.name;
    let mut out = ResolvedDependencySet {
        resolved_public: descriptor.public_dependencies.clone(),
        resolved_private: descriptor.private_dependencies.clone(),
        resolved_dynamic: descriptor.dynamic_dependencies.clone(),
        include_paths: descriptor
            .include_paths
            .iter()
            .chain(&descriptor.private_include_paths)
            .cloned()
            .collect(),
        pch_usage: descriptor.pch_usage,
        overrides: Vec::new(),
    };
    let mut errors = Vec::new();

    for (index, rule) in descriptor.conditional_dependencies.iter().enumerate() {
        let predicate = match Predicate::parse(&rule.predicate) {
            Ok(p) => p,
            Err(e) => {
                // validate() already parsed it; only reachable if the two disagree.
                return Err(vec![DescriptorError::new(
                    name,
                    DescriptorErrorKind::MalformedPredicate,
                    rule.predicate.as_str(),
                )
                .with_detail(e.to_string())]);
            }
        };

        if !predicate.eval(context) {
            debug!(
                "[{}] rule #{} '{}' does not apply",
                name, index, rule.predicate
            );
            continue;
        }
        debug!(
            "[{}] rule #{} '{}' applies: {:?} -> {}",
            name, index, rule.predicate, rule.modules, rule.visibility
        );

        let opposite = rule.visibility.opposite();
        for module in &rule.modules {
            if out.resolved_dynamic.contains(module) {
                errors.push(
                    DescriptorError::new(name, DescriptorErrorKind::DynamicConflict, module.as_str())
                        .with_detail(format!("added as {} by '{}'", rule.visibility, rule.predicate)),
                );
                continue;
            }

            if out.set_mut(opposite).remove(module) {
                match options.conflict_policy {
                    ConflictPolicy::Override => {
                        debug!(
                            "[{}] '{}' moved from {} to {} by rule #{}",
                            name, module, opposite, rule.visibility, index
                        );
                        out.overrides.push(OverrideRecord {
                            module: module.clone(),
                            from: opposite,
                            to: rule.visibility,
                            rule_index: index,
                            predicate: rule.predicate.clone(),
                        });
                    }
                    ConflictPolicy::Reject => {
                        errors.push(
                            DescriptorError::new(
                                name,
                                DescriptorErrorKind::ConflictingVisibility,
                                module.as_str(),
                            )
                            .with_detail(format!(
                                "'{}' moves it from {} to {}",
                                rule.predicate, opposite, rule.visibility
                            )),
                        );
                        continue;
                    }
                }
            }
            out.set_mut(rule.visibility).insert(module.clone());
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    debug_assert!(out.resolved_public.is_disjoint(&out.resolved_private));
    debug_assert!(out.resolved_public.is_disjoint(&out.resolved_dynamic));
    debug_assert!(out.resolved_private.is_disjoint(&out.resolved_dynamic));
    Ok(out)
}

/// Names that occur on more than one descriptor in `descriptors`.
pub fn duplicate_names<'a, I>(descriptors: I) -> BTreeSet<ModuleId>
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    let mut seen = BTreeSet::new();
    let mut dupes = BTreeSet::new();
    for d in descriptors {
        if !seen.insert(&d.name) {
            dupes.insert(d.name.clone());
        }
    }
    dupes
}

/// Resolves every descriptor in `descriptors` against one context.
///
/// Failing modules are collected in [`Resolution::errors`]; the rest of the
/// batch still resolves.
pub fn resolve<'a, I>(descriptors: I, context: &TargetContext) -> Resolution
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    resolve_with(descriptors, context, &ResolveOptions::default())
}

pub fn resolve_with<'a, I>(
    descriptors: I,
    context: &TargetContext,
    options: &ResolveOptions,
) -> Resolution
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    let descriptors: Vec<&Descriptor> = descriptors.into_iter().collect();
    let mut resolution = Resolution::default();
    let dupes = resolution.record_duplicates(descriptors.iter().copied());

    for descriptor in descriptors.into_iter().filter(|d| !dupes.contains(&d.name)) {
        let outcome = resolve_descriptor(descriptor, context, options);
        if let Err(errs) = &outcome {
            warn!(
                "Resolution failed for module '{}' ({} error(s)), continuing with others.",
                descriptor.name,
                errs.len()
            );
        }
        resolution.record(descriptor.name.clone(), outcome);
    }

    debug!(
        "Resolved {} module(s), {} failed, context {}",
        resolution.resolved.len(),
        resolution.errors.len(),
        context
    );
    resolution
}
