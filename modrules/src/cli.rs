// modrules/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use modrules_common::error::{ModrulesError, Result};
use modrules_common::model::context::TargetContextBuilder;
use modrules_common::model::TargetContext;
use modrules_common::Config;
use modrules_core::loader::{load_dir, DescriptorSet};
use tracing::debug;

pub mod diff;
pub mod gated;
pub mod resolve;
pub mod validate;

use crate::cli::diff::Diff;
use crate::cli::gated::Gated;
use crate::cli::resolve::Resolve;
use crate::cli::validate::Validate;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "modrules", bin_name = "modrules")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check descriptors without resolving them
    Validate(Validate),
    /// Resolve descriptors against a target context
    Resolve(Resolve),
    /// List dependencies that only appear under a flag
    Gated(Gated),
    /// Show what changes between two target contexts
    Diff(Diff),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Validate(command) => command.run(config).await,
            Self::Resolve(command) => command.run(config).await,
            Self::Gated(command) => command.run(config).await,
            Self::Diff(command) => command.run(config).await,
        }
    }
}

/// Target flag options shared by commands that resolve.
#[derive(Args, Debug, Default)]
pub struct ContextArgs {
    /// Set a flag, e.g. `--set editorBuild=true` or `--set platform=Win64`
    #[arg(long = "set", value_name = "FLAG=VALUE")]
    pub assignments: Vec<String>,

    /// Read flags from a TOML or JSON file before applying `--set`
    #[arg(long = "context", value_name = "FILE")]
    pub context_file: Option<PathBuf>,
}

impl ContextArgs {
    /// Config defaults, then the context file, then `--set` assignments.
    pub fn build(&self, config: &Config) -> Result<TargetContext> {
        let mut context = config.default_flags.clone();
        if let Some(path) = &self.context_file {
            context = context.overlay(&read_context_file(path)?);
        }
        let overrides = apply_assignments(TargetContext::builder(), &self.assignments)?;
        let context = context.overlay(&overrides.build());
        debug!("Target context: {}", context);
        Ok(context)
    }
}

pub fn apply_assignments(
    mut builder: TargetContextBuilder,
    assignments: &[String],
) -> Result<TargetContextBuilder> {
    for raw in assignments {
        builder = builder.assignment(raw)?;
    }
    Ok(builder)
}

fn read_context_file(path: &Path) -> Result<TargetContext> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ModrulesError::Config(format!("cannot read context file {}: {e}", path.display()))
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => TargetContext::from_json_str(&raw),
        _ => TargetContext::from_toml_str(&raw),
    }
}

/// Loads descriptors from `path`, or from the configured root.
pub async fn load_descriptors(path: Option<&Path>, config: &Config) -> Result<DescriptorSet> {
    let root = path.unwrap_or_else(|| config.root());
    let set = load_dir(root).await?;
    for failure in &set.failures {
        eprintln!(
            "{} {}: {}",
            "Error:".red().bold(),
            failure.path.display(),
            failure.error
        );
    }
    if set.is_empty() && set.failures.is_empty() {
        println!(
            "{}",
            format!("No descriptors found under {}", root.display()).yellow()
        );
    }
    Ok(set)
}
