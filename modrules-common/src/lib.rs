// modrules-common/src/lib.rs
pub mod config;
pub mod dependency;
pub mod error;
pub mod model;

// Re-export key types
pub use config::Config;
pub use dependency::{resolve, Resolution, ResolvedDependencySet};
pub use error::{DescriptorError, DescriptorErrorKind, ModrulesError, Result};
pub use model::descriptor::validate;
pub use model::{Descriptor, ModuleId, TargetContext};
