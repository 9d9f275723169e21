// modrules-core/src/lib.rs

pub mod engine;
pub mod loader;
pub mod query;
pub mod references;

// Re-export key types for easier use by the CLI crate
pub use engine::{default_workers, resolve_parallel};
pub use loader::{load_dir, DescriptorSet, LoadedDescriptor};
pub use query::{diff, gated_modules, ContextDiff, DiffReport};
pub use references::{check_references, EdgeKind, ReferenceError};
