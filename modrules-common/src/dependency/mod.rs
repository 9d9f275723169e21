pub mod predicate;
pub mod resolver;

pub use predicate::{Predicate, PredicateError};
pub use resolver::{
    resolve, resolve_descriptor, resolve_with, ConflictPolicy, OverrideRecord, Resolution,
    ResolveOptions, ResolvedDependencySet,
};
