use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use modrules_common::dependency::{ConflictPolicy, Resolution, ResolveOptions};
use modrules_common::error::{ModrulesError, Result};
use modrules_common::model::{Descriptor, ModuleId, TargetContext};
use modrules_common::Config;
use modrules_core::references::ReferenceError;
use modrules_core::{check_references, default_workers, resolve_parallel};
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use tracing::debug;

use crate::cli::{load_descriptors, ContextArgs};

#[derive(Args, Debug)]
pub struct Resolve {
    /// Descriptor file or directory (defaults to the configured root)
    pub path: Option<PathBuf>,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Only print these modules
    #[arg(long = "module", value_name = "NAME")]
    pub modules: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Fail instead of overriding when a rule flips a module's visibility
    #[arg(long)]
    pub strict: bool,

    /// Report dependencies that have no descriptor and are not external
    #[arg(long)]
    pub check_references: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    context: &'a TargetContext,
    #[serde(flatten)]
    resolution: &'a Resolution,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    unknown_references: &'a [ReferenceError],
}

/// Everything one `resolve` invocation found, after `--module` filtering.
#[derive(Debug)]
struct ResolveReport {
    context: TargetContext,
    resolution: Resolution,
    unknown: Vec<ReferenceError>,
    load_failures: usize,
}

impl ResolveReport {
    fn problem_count(&self) -> usize {
        self.resolution.error_count() + self.unknown.len() + self.load_failures
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonReport {
            context: &self.context,
            resolution: &self.resolution,
            unknown_references: &self.unknown,
        })
    }
}

impl Resolve {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let report = self.collect(config).await?;

        if self.json {
            println!("{}", report.to_json()?);
        } else {
            print_table(&report.resolution);
            for err in report.resolution.errors.values().flatten() {
                eprintln!("{} {}", "✖".red().bold(), err);
            }
            for u in &report.unknown {
                eprintln!("{} {}", "?".yellow().bold(), u);
            }
        }

        let failed = report.problem_count();
        if failed > 0 {
            return Err(ModrulesError::Generic(format!("{failed} problem(s) found")));
        }
        Ok(())
    }

    async fn collect(&self, config: &Config) -> Result<ResolveReport> {
        let set = load_descriptors(self.path.as_deref(), config).await?;
        let context = self.context.build(config)?;

        let mut options = config.resolve_options();
        if self.strict {
            options = ResolveOptions {
                conflict_policy: ConflictPolicy::Reject,
            };
        }
        let workers = config.workers.unwrap_or_else(default_workers);
        debug!("Resolving {} descriptor(s) with {} worker(s)", set.len(), workers);

        let descriptors: Vec<Arc<Descriptor>> = set.descriptors().cloned().map(Arc::new).collect();
        let mut resolution =
            resolve_parallel(descriptors, Arc::new(context.clone()), options, workers);

        let mut unknown = if self.check_references {
            check_references(set.descriptors(), &resolution, &config.external_modules)
        } else {
            Vec::new()
        };

        if !self.modules.is_empty() {
            let keep = |m: &ModuleId| self.modules.iter().any(|n| n == m.as_str());
            resolution.resolved.retain(|m, _| keep(m));
            resolution.errors.retain(|m, _| keep(m));
            unknown.retain(|u| keep(&u.module));
        }

        Ok(ResolveReport {
            context,
            resolution,
            unknown,
            load_failures: set.failures.len(),
        })
    }
}

fn join(ids: &std::collections::BTreeSet<ModuleId>) -> String {
    ids.iter().map(ModuleId::as_str).collect::<Vec<_>>().join(", ")
}

fn print_table(resolution: &Resolution) {
    if resolution.resolved.is_empty() {
        println!("{}", "0 modules resolved".yellow());
        return;
    }
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(vec![
        Cell::new("Module").style_spec("b"),
        Cell::new("Public").style_spec("b"),
        Cell::new("Private").style_spec("b"),
        Cell::new("Dynamic").style_spec("b"),
        Cell::new("Overrides").style_spec("b"),
    ]));
    for (module, set) in &resolution.resolved {
        let overrides = set
            .overrides
            .iter()
            .map(|o| format!("{} {}→{}", o.module, o.from, o.to))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(Row::new(vec![
            Cell::new(module.as_str()).style_spec("Fb"),
            Cell::new(&join(&set.resolved_public)).style_spec("Fg"),
            Cell::new(&join(&set.resolved_private)),
            Cell::new(&join(&set.resolved_dynamic)).style_spec("Fy"),
            Cell::new(&overrides),
        ]));
    }
    table.printstd();
    println!(
        "{}",
        format!(
            "{} modules resolved, {} failed",
            resolution.resolved.len(),
            resolution.errors.len()
        )
        .bold()
    );
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str, body: &str| {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        };
        write("modrules.toml", "external_modules = [\"Core\", \"Slate\"]\nworkers = 2\n");
        write(
            "Source/Game/Game.module.toml",
            "publicDependencies = [\"Core\", \"Slate\"]\n\n[[conditionalDependencies]]\npredicate = \"editorBuild\"\nmodules = [\"Slate\"]\nvisibility = \"private\"\n",
        );
        write(
            "Source/Broken/Broken.module.json",
            r#"{ "publicDependencies": ["Core"], "privateDependencies": ["Core"] }"#,
        );
        write(
            "Source/Tools/Tools.module.json",
            r#"{ "publicDependencies": ["Game", "Missing"] }"#,
        );
        dir
    }

    fn resolve_cmd(root: &Path) -> Resolve {
        Resolve {
            path: Some(root.join("Source")),
            context: ContextArgs {
                assignments: vec!["editorBuild=true".into()],
                context_file: None,
            },
            modules: Vec::new(),
            json: false,
            strict: false,
            check_references: false,
        }
    }

    #[tokio::test]
    async fn failing_module_fails_the_command() {
        let dir = tree();
        let config = Config::load_from(dir.path()).unwrap();
        let cmd = resolve_cmd(dir.path());
        let report = cmd.collect(&config).await.unwrap();
        assert_eq!(report.problem_count(), 1);
        assert!(report.resolution.errors.contains_key("Broken"));
        assert_eq!(report.resolution.get("Game").unwrap().overrides.len(), 1);
        assert!(cmd.run(&config).await.is_err());
    }

    #[tokio::test]
    async fn module_filter_hides_other_failures() {
        let dir = tree();
        let config = Config::load_from(dir.path()).unwrap();
        let cmd = Resolve {
            modules: vec!["Game".into()],
            ..resolve_cmd(dir.path())
        };
        let report = cmd.collect(&config).await.unwrap();
        assert_eq!(report.resolution.resolved.len(), 1);
        assert!(report.resolution.errors.is_empty());
        assert!(cmd.run(&config).await.is_ok());
    }

    #[tokio::test]
    async fn strict_rejects_visibility_flips() {
        let dir = tree();
        let config = Config::load_from(dir.path()).unwrap();
        let cmd = Resolve {
            modules: vec!["Game".into()],
            strict: true,
            ..resolve_cmd(dir.path())
        };
        let report = cmd.collect(&config).await.unwrap();
        assert_eq!(
            report.resolution.errors["Game"][0].kind,
            modrules_common::DescriptorErrorKind::ConflictingVisibility
        );
        assert!(cmd.run(&config).await.is_err());
    }

    #[tokio::test]
    async fn unknown_references_are_reported() {
        let dir = tree();
        let config = Config::load_from(dir.path()).unwrap();
        let cmd = Resolve {
            modules: vec!["Tools".into(), "Game".into()],
            check_references: true,
            ..resolve_cmd(dir.path())
        };
        let report = cmd.collect(&config).await.unwrap();
        let unknown: Vec<&str> = report.unknown.iter().map(|u| u.reference.as_str()).collect();
        assert_eq!(unknown, vec!["Missing"]);
        assert!(cmd.run(&config).await.is_err());
    }

    #[tokio::test]
    async fn json_report_has_context_resolution_and_references() {
        let dir = tree();
        let config = Config::load_from(dir.path()).unwrap();
        let cmd = Resolve {
            check_references: true,
            json: true,
            ..resolve_cmd(dir.path())
        };
        let report = cmd.collect(&config).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["context"]["editorBuild"], serde_json::json!(true));
        assert_eq!(
            value["resolved"]["Game"]["resolvedPrivate"],
            serde_json::json!(["Slate"])
        );
        assert_eq!(value["errors"]["Broken"][0]["kind"], "DuplicateVisibility");
        assert_eq!(value["unknownReferences"][0]["reference"], "Missing");

        let clean = Resolve {
            modules: vec!["Game".into()],
            ..cmd
        };
        let report = clean.collect(&config).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert!(value.get("unknownReferences").is_none());
    }
}
