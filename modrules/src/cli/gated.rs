use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use modrules_common::error::Result;
use modrules_common::model::ModuleId;
use modrules_common::Config;
use modrules_core::gated_modules;

use crate::cli::load_descriptors;

#[derive(Args, Debug)]
pub struct Gated {
    /// Flag name, e.g. `editorBuild`
    pub flag: String,

    /// Descriptor file or directory (defaults to the configured root)
    pub path: Option<PathBuf>,
}

impl Gated {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let set = load_descriptors(self.path.as_deref(), config).await?;
        let gated = gated_modules(set.descriptors(), &self.flag);

        if gated.is_empty() {
            println!(
                "{}",
                format!("No dependencies are gated by '{}'", self.flag).yellow()
            );
            return Ok(());
        }
        for (module, deps) in &gated {
            let deps: Vec<&str> = deps.iter().map(ModuleId::as_str).collect();
            println!("{} {}", format!("{module}:").bold(), deps.join(", "));
        }
        Ok(())
    }
}
