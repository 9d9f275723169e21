// modrules-core/src/references.rs
//! Cross-module checks run on resolver output.
use std::collections::BTreeSet;
use std::fmt;

use modrules_common::dependency::Resolution;
use modrules_common::model::{Descriptor, ModuleId};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Public,
    Private,
    Dynamic,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[error("module '{module}': unknown module reference '{reference}' ({edge})")]
pub struct ReferenceError {
    pub module: ModuleId,
    pub reference: ModuleId,
    pub edge: EdgeKind,
}

/// Reports every resolved dependency that names neither a descriptor in
/// `descriptors` nor one of `externals`.
///
/// Modules that failed to resolve are still counted as known, so a broken
/// descriptor does not cascade into reference errors for its dependents.
pub fn check_references<'a, I>(
    descriptors: I,
    resolution: &Resolution,
    externals: &BTreeSet<ModuleId>,
) -> Vec<ReferenceError>
where
    I: IntoIterator<Item = &'a Descriptor>,
{
    let known: BTreeSet<&ModuleId> = descriptors
        .into_iter()
        .map(|d| &d.name)
        .chain(externals)
        .collect();

    let mut errors = Vec::new();
    for (module, set) in &resolution.resolved {
        let edges = [
            (EdgeKind::Public, &set.resolved_public),
            (EdgeKind::Private, &set.resolved_private),
            (EdgeKind::Dynamic, &set.resolved_dynamic),
        ];
        for (edge, ids) in edges {
            for reference in ids.iter().filter(|id| !known.contains(id)) {
                errors.push(ReferenceError {
                    module: module.clone(),
                    reference: reference.clone(),
                    edge,
                });
            }
        }
    }
    debug!("Reference check found {} unknown reference(s)", errors.len());
    errors
}
