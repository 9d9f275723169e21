// modrules-common/src/model/descriptor.rs
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ModuleId;
use crate::dependency::predicate::Predicate;
use crate::error::{DescriptorError, DescriptorErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn opposite(self) -> Self {
        match self {
            Self::Public => Self::Private,
            Self::Private => Self::Public,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Precompiled header policy. Carried through resolution untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PchUsage {
    Default,
    UseSharedPchs,
    #[default]
    UseExplicitOrSharedPchs,
    NoPchs,
}

/// One entry of `conditionalDependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConditionalRule {
    pub predicate: String,
    #[serde(default)]
    pub modules: BTreeSet<ModuleId>,
    pub visibility: Visibility,
}

impl ConditionalRule {
    pub fn new<I, S>(predicate: impl Into<String>, modules: I, visibility: Visibility) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        Self {
            predicate: predicate.into(),
            modules: modules.into_iter().map(Into::into).collect(),
            visibility,
        }
    }
}

/// Static build requirements of a single module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Descriptor {
    #[serde(default)]
    pub name: ModuleId,
    #[serde(default, alias = "publicIncludePaths")]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub private_include_paths: Vec<String>,
    #[serde(default)]
    pub public_dependencies: BTreeSet<ModuleId>,
    #[serde(default)]
    pub private_dependencies: BTreeSet<ModuleId>,
    #[serde(default)]
    pub conditional_dependencies: Vec<ConditionalRule>,
    #[serde(default)]
    pub dynamic_dependencies: BTreeSet<ModuleId>,
    #[serde(default)]
    pub pch_usage: PchUsage,
}

fn ids<I, S>(names: I) -> BTreeSet<ModuleId>
where
    I: IntoIterator<Item = S>,
    S: Into<ModuleId>,
{
    names.into_iter().map(Into::into).collect()
}

impl Descriptor {
    pub fn new(name: impl Into<ModuleId>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_public<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        self.public_dependencies.extend(ids(names));
        self
    }

    pub fn with_private<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        self.private_dependencies.extend(ids(names));
        self
    }

    pub fn with_dynamic<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        self.dynamic_dependencies.extend(ids(names));
        self
    }

    pub fn with_rule(mut self, rule: ConditionalRule) -> Self {
        self.conditional_dependencies.push(rule);
        self
    }

    pub fn with_include_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_private_include_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.private_include_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Every identifier the descriptor mentions, conditional rules included.
    pub fn referenced_modules(&self) -> BTreeSet<&ModuleId> {
        self.public_dependencies
            .iter()
            .chain(&self.private_dependencies)
            .chain(&self.dynamic_dependencies)
            .chain(self.conditional_dependencies.iter().flat_map(|r| &r.modules))
            .collect()
    }

    /// Checks the descriptor on its own, without any target context.
    ///
    /// Returns every problem found; an empty vector means the descriptor can
    /// be resolved.
    pub fn validate(&self) -> Vec<DescriptorError> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(DescriptorError::new(
                &self.name,
                DescriptorErrorKind::EmptyIdentifier,
                "name",
            ));
        }

        if self.referenced_modules().iter().any(|id| id.is_empty()) {
            errors.push(DescriptorError::new(
                &self.name,
                DescriptorErrorKind::EmptyIdentifier,
                "dependency",
            ));
        }

        for id in self
            .public_dependencies
            .intersection(&self.private_dependencies)
        {
            errors.push(DescriptorError::new(
                &self.name,
                DescriptorErrorKind::DuplicateVisibility,
                id.as_str(),
            ));
        }

        for id in self.dynamic_dependencies.iter().filter(|id| {
            self.public_dependencies.contains(*id) || self.private_dependencies.contains(*id)
        }) {
            errors.push(DescriptorError::new(
                &self.name,
                DescriptorErrorKind::DynamicConflict,
                id.as_str(),
            ));
        }

        if !self.name.is_empty() && self.referenced_modules().contains(&self.name) {
            errors.push(DescriptorError::new(
                &self.name,
                DescriptorErrorKind::SelfDependency,
                self.name.as_str(),
            ));
        }

        for rule in &self.conditional_dependencies {
            if let Err(e) = Predicate::parse(&rule.predicate) {
                errors.push(
                    DescriptorError::new(
                        &self.name,
                        DescriptorErrorKind::MalformedPredicate,
                        rule.predicate.as_str(),
                    )
                    .with_detail(e.to_string()),
                );
            }
        }

        errors
    }
}

/// Free-standing form of [`Descriptor::validate`] for descriptor loaders.
pub fn validate(descriptor: &Descriptor) -> Vec<DescriptorError> {
    descriptor.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(errors: &[DescriptorError]) -> Vec<DescriptorErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn clean_descriptor_has_no_errors() {
        let d = Descriptor::new("AssetDump")
            .with_public(["Core", "Engine"])
            .with_private(["JsonUtilities"])
            .with_rule(ConditionalRule::new(
                "editorBuild == true",
                ["BlueprintGraph"],
                Visibility::Private,
            ));
        assert!(d.validate().is_empty());
    }

    #[test]
    fn public_and_private_overlap_is_duplicate_visibility() {
        let d = Descriptor::new("M").with_public(["Foo"]).with_private(["Foo"]);
        let errors = validate(&d);
        assert_eq!(kinds(&errors), vec![DescriptorErrorKind::DuplicateVisibility]);
        assert_eq!(errors[0].subject, "Foo");
        assert_eq!(errors[0].module, ModuleId::from("M"));
    }

    #[test]
    fn self_reference_anywhere_is_rejected() {
        let direct = Descriptor::new("M").with_private(["M"]);
        assert_eq!(
            kinds(&direct.validate()),
            vec![DescriptorErrorKind::SelfDependency]
        );

        let conditional = Descriptor::new("M").with_rule(ConditionalRule::new(
            "editorBuild",
            ["M"],
            Visibility::Public,
        ));
        assert_eq!(
            kinds(&conditional.validate()),
            vec![DescriptorErrorKind::SelfDependency]
        );
    }

    #[test]
    fn malformed_predicate_cites_the_text() {
        let d = Descriptor::new("M").with_rule(ConditionalRule::new(
            "editorBuild ===",
            ["X"],
            Visibility::Private,
        ));
        let errors = d.validate();
        assert_eq!(kinds(&errors), vec![DescriptorErrorKind::MalformedPredicate]);
        assert_eq!(errors[0].subject, "editorBuild ===");
        assert!(errors[0].detail.is_some());
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let d = Descriptor::new("").with_public([""]);
        let errors = d.validate();
        assert_eq!(
            kinds(&errors),
            vec![
                DescriptorErrorKind::EmptyIdentifier,
                DescriptorErrorKind::EmptyIdentifier
            ]
        );
    }

    #[test]
    fn linked_and_dynamic_is_rejected() {
        let d = Descriptor::new("M").with_public(["Foo"]).with_dynamic(["Foo"]);
        assert_eq!(
            kinds(&d.validate()),
            vec![DescriptorErrorKind::DynamicConflict]
        );
    }

    #[test]
    fn deserializes_camel_case_json() {
        let raw = r#"{
            "name": "AssetDump",
            "includePaths": ["Public"],
            "privateIncludePaths": ["Private"],
            "publicDependencies": ["Core", "Engine"],
            "privateDependencies": ["InputCore"],
            "conditionalDependencies": [
                { "predicate": "editorBuild == true", "modules": ["BlueprintGraph"], "visibility": "private" }
            ],
            "dynamicDependencies": [],
            "pchUsage": "useExplicitOrSharedPchs"
        }"#;
        let d: Descriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(d.name.as_str(), "AssetDump");
        assert_eq!(d.include_paths, vec!["Public".to_string()]);
        assert_eq!(d.conditional_dependencies.len(), 1);
        assert_eq!(d.conditional_dependencies[0].visibility, Visibility::Private);
        assert_eq!(d.pch_usage, PchUsage::UseExplicitOrSharedPchs);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{ "name": "M", "publicDeps": ["Core"] }"#;
        assert!(serde_json::from_str::<Descriptor>(raw).is_err());
    }
}
