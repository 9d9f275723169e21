// modrules-common/src/config.rs
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use super::dependency::{ConflictPolicy, ResolveOptions};
use super::error::{ModrulesError, Result};
use super::model::{ModuleId, TargetContext};

pub const CONFIG_FILENAME: &str = "modrules.toml";
const ROOT_ENV: &str = "MODRULES_ROOT";
const WORKERS_ENV: &str = "MODRULES_WORKERS";

/// On-disk shape of `modrules.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    default_flags: TargetContext,
    external_modules: BTreeSet<ModuleId>,
    workers: Option<usize>,
    conflict_policy: ConflictPolicy,
    logs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    /// Flags applied before any command-line overrides.
    pub default_flags: TargetContext,
    /// Modules the orchestrator provides without a descriptor (engine modules).
    pub external_modules: BTreeSet<ModuleId>,
    pub workers: Option<usize>,
    pub conflict_policy: ConflictPolicy,
    logs_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading modrules configuration");

        let root = match env::var(ROOT_ENV).ok().filter(|s| !s.is_empty()) {
            Some(r) => PathBuf::from(r),
            None => {
                debug!("{ROOT_ENV} not set or empty, using the current directory");
                env::current_dir()?
            }
        };
        Self::load_from(&root)
    }

    /// Loads configuration for the descriptor tree at `root`.
    ///
    /// `root/modrules.toml` wins over the user-level file; neither is required.
    pub fn load_from(root: &Path) -> Result<Self> {
        let candidates = [
            Some(root.join(CONFIG_FILENAME)),
            user_config_dir().map(|d| d.join(CONFIG_FILENAME)),
        ];
        let config_file = candidates.into_iter().flatten().find(|p| p.is_file());

        let file = match &config_file {
            Some(path) => {
                debug!("Reading configuration from {}", path.display());
                let raw = fs::read_to_string(path)?;
                toml::from_str::<ConfigFile>(&raw).map_err(|e| {
                    ModrulesError::Config(format!("{}: {e}", path.display()))
                })?
            }
            None => {
                debug!("No {CONFIG_FILENAME} found, using defaults");
                ConfigFile::default()
            }
        };

        let workers = match env::var(WORKERS_ENV).ok().filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<usize>().map_err(|e| {
                ModrulesError::Config(format!("{WORKERS_ENV}='{raw}' is not a number: {e}"))
            })?),
            None => file.workers,
        };
        if workers == Some(0) {
            return Err(ModrulesError::Config("workers must be at least 1".into()));
        }

        debug!("Effective modrules root: {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            default_flags: file.default_flags,
            external_modules: file.external_modules,
            workers,
            conflict_policy: file.conflict_policy,
            logs_dir: file.logs_dir,
            config_file,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        match &self.logs_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.root.join(dir),
            None => ProjectDirs::from("", "", "modrules")
                .map(|d| d.data_local_dir().join("logs"))
                .unwrap_or_else(|| self.root.join(".modrules").join("logs")),
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            conflict_policy: self.conflict_policy,
        }
    }
}

fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "modrules").map(|d| d.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_project_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"
external_modules = ["Core", "Engine"]
conflict_policy = "reject"
logs_dir = "build/logs"

[default_flags]
editorBuild = true
platform = "Linux"
"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert!(config.default_flags.get("editorBuild"));
        assert!(config.external_modules.contains("Engine"));
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.logs_dir(), dir.path().join("build/logs"));
        assert_eq!(
            config.config_file.as_deref(),
            Some(dir.path().join(CONFIG_FILENAME).as_path())
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "colour = \"blue\"\n").unwrap();
        let err = Config::load_from(dir.path()).unwrap_err();
        assert!(matches!(err, ModrulesError::Config(_)));
    }
}
