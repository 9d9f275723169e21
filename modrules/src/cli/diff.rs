use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use modrules_common::error::{ModrulesError, Result};
use modrules_common::model::{ModuleId, TargetContext};
use modrules_common::Config;
use modrules_core::diff;

use crate::cli::{apply_assignments, load_descriptors, ContextArgs};

#[derive(Args, Debug)]
pub struct Diff {
    /// Descriptor file or directory (defaults to the configured root)
    pub path: Option<PathBuf>,

    /// Flags of the context to compare against
    #[command(flatten)]
    pub context: ContextArgs,

    /// Flags of the baseline context, layered on the configured defaults
    #[arg(long = "against", value_name = "FLAG=VALUE")]
    pub against: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

fn print_change(sign: colored::ColoredString, label: &str, ids: &BTreeSet<ModuleId>) {
    if ids.is_empty() {
        return;
    }
    let ids: Vec<&str> = ids.iter().map(ModuleId::as_str).collect();
    println!("  {sign} {label}: {}", ids.join(", "));
}

impl Diff {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let set = load_descriptors(self.path.as_deref(), config).await?;
        let base = config.default_flags.overlay(
            &apply_assignments(TargetContext::builder(), &self.against)?.build(),
        );
        let other = self.context.build(config)?;

        let report = diff(set.descriptors(), &base, &other, &config.resolve_options());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{} {} → {}", "==>".bold().blue(), base, other);
            if report.modules.is_empty() {
                println!("{}", "No dependency changes".yellow());
            }
            for (module, change) in &report.modules {
                println!("{}", module.as_str().bold());
                print_change("+".green(), "public", &change.added_public);
                print_change("+".green(), "private", &change.added_private);
                print_change("-".red(), "public", &change.removed_public);
                print_change("-".red(), "private", &change.removed_private);
            }
            for err in report.errors.values().flatten() {
                eprintln!("{} {}", "✖".red().bold(), err);
            }
        }

        let failed: usize = report.errors.values().map(Vec::len).sum();
        if failed > 0 {
            return Err(ModrulesError::Generic(format!("{failed} problem(s) found")));
        }
        Ok(())
    }
}
