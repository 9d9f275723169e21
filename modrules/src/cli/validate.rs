use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use modrules_common::dependency::resolver::duplicate_names;
use modrules_common::error::{DescriptorError, DescriptorErrorKind, ModrulesError, Result};
use modrules_common::Config;

use crate::cli::load_descriptors;

#[derive(Args, Debug)]
pub struct Validate {
    /// Descriptor file or directory (defaults to the configured root)
    pub path: Option<PathBuf>,
}

impl Validate {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let set = load_descriptors(self.path.as_deref(), config).await?;

        let mut errors: Vec<DescriptorError> = set
            .descriptors()
            .flat_map(|d| d.validate())
            .collect();
        for dupe in duplicate_names(set.descriptors()) {
            errors.push(DescriptorError::new(
                &dupe,
                DescriptorErrorKind::DuplicateModule,
                dupe.as_str(),
            ));
        }
        errors.sort();

        for err in &errors {
            let location = set
                .find(err.module.as_str())
                .map(|l| l.path.display().to_string())
                .unwrap_or_default();
            println!("{} {} {}", "✖".red().bold(), err, location.dimmed());
        }

        let failed = errors.len() + set.failures.len();
        if failed > 0 {
            return Err(ModrulesError::Generic(format!(
                "{failed} problem(s) in {} descriptor file(s)",
                set.len() + set.failures.len()
            )));
        }
        println!(
            "{}",
            format!("{} descriptor(s) valid", set.len()).green().bold()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn problems_fail_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        fs::write(
            dir.path().join("Game.module.json"),
            r#"{ "publicDependencies": ["Core"] }"#,
        )
        .unwrap();
        let cmd = Validate {
            path: Some(dir.path().to_path_buf()),
        };
        assert!(cmd.run(&config).await.is_ok());

        fs::write(
            dir.path().join("Tools.module.json"),
            r#"{ "publicDependencies": ["Json"], "privateDependencies": ["Json"] }"#,
        )
        .unwrap();
        assert!(cmd.run(&config).await.is_err());
    }
}
