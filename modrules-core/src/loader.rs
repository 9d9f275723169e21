// modrules-core/src/loader.rs
//! Finds and parses descriptor files (`*.module.json`, `*.module.toml`).
use std::path::{Path, PathBuf};

use futures::future::join_all;
use modrules_common::error::{ModrulesError, Result};
use modrules_common::model::{Descriptor, ModuleId};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Json,
    Toml,
}

const SUFFIXES: [(&str, DescriptorFormat); 2] = [
    (".module.json", DescriptorFormat::Json),
    (".module.toml", DescriptorFormat::Toml),
];

impl DescriptorFormat {
    /// Format and module stem for a descriptor file name, if it is one.
    pub fn detect(file_name: &str) -> Option<(Self, &str)> {
        SUFFIXES.iter().find_map(|(suffix, format)| {
            file_name
                .strip_suffix(suffix)
                .filter(|stem| !stem.is_empty())
                .map(|stem| (*format, stem))
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDescriptor {
    pub path: PathBuf,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: ModrulesError,
}

/// Descriptors found under one root, plus the files that could not be read.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    pub loaded: Vec<LoadedDescriptor>,
    pub failures: Vec<LoadFailure>,
}

impl DescriptorSet {
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.loaded.iter().map(|l| &l.descriptor)
    }

    pub fn find(&self, name: &str) -> Option<&LoadedDescriptor> {
        self.loaded.iter().find(|l| l.descriptor.name.as_str() == name)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Parses one descriptor. An empty `name` is filled in from `stem`.
pub fn parse_descriptor(raw: &str, format: DescriptorFormat, stem: &str) -> Result<Descriptor> {
    let mut descriptor: Descriptor = match format {
        DescriptorFormat::Json => serde_json::from_str(raw)?,
        DescriptorFormat::Toml => toml::from_str(raw)?,
    };
    if descriptor.name.as_str().is_empty() {
        descriptor.name = ModuleId::from(stem);
    } else if descriptor.name.as_str() != stem {
        warn!(
            "Descriptor for '{}' is stored as '{}'; using the declared name",
            descriptor.name, stem
        );
    }
    Ok(descriptor)
}

/// Descriptor files under `root`, sorted by path.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(ModrulesError::NotFound(format!(
            "descriptor root {} does not exist",
            root.display()
        )));
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| ModrulesError::Io(std::sync::Arc::new(e.into())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_descriptor = entry
            .file_name()
            .to_str()
            .and_then(DescriptorFormat::detect)
            .is_some();
        if is_descriptor {
            paths.push(entry.into_path());
        }
    }
    debug!("Discovered {} descriptor file(s) under {}", paths.len(), root.display());
    Ok(paths)
}

async fn load_file(path: PathBuf) -> std::result::Result<LoadedDescriptor, LoadFailure> {
    let fail = |path: &Path, error: ModrulesError| LoadFailure {
        path: path.to_path_buf(),
        error,
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let Some((format, stem)) = DescriptorFormat::detect(&file_name) else {
        return Err(fail(
            &path,
            ModrulesError::ParseError(
                "descriptor",
                format!("{file_name} is not a .module.json or .module.toml file"),
            ),
        ));
    };

    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => return Err(fail(&path, e.into())),
    };
    match parse_descriptor(&raw, format, stem) {
        Ok(descriptor) => Ok(LoadedDescriptor { path, descriptor }),
        Err(e) => Err(fail(&path, e)),
    }
}

/// Reads every descriptor under `root` concurrently.
///
/// Unreadable or unparsable files are collected in
/// [`DescriptorSet::failures`] instead of aborting the load.
#[instrument(skip_all, fields(root = %root.display()))]
pub async fn load_dir(root: &Path) -> Result<DescriptorSet> {
    let paths = discover(root)?;
    let results = join_all(paths.into_iter().map(load_file)).await;

    let mut set = DescriptorSet::default();
    for result in results {
        match result {
            Ok(loaded) => set.loaded.push(loaded),
            Err(failure) => {
                warn!("Failed to load {}: {}", failure.path.display(), failure.error);
                set.failures.push(failure);
            }
        }
    }
    debug!(
        "Loaded {} descriptor(s), {} failure(s)",
        set.loaded.len(),
        set.failures.len()
    );
    Ok(set)
}
