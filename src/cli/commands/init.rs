//! `fsd init` command - Initialize a new fsd project

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Rewrite the project config even if .fsd/ already exists (records are kept)
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    match Project::init(&path, args.force) {
        Ok(project) => {
            println!(
                "{} Initialized fsd project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Next steps:");
            println!(
                "  {} Set the tenant in {}",
                style("1.").dim(),
                style(".fsd/config.yaml").yellow()
            );
            println!(
                "  {} Add an inventory item",
                style("fsd item new -S name=... -S category=... -S quantity=...").yellow()
            );
            println!(
                "  {} Import from a spreadsheet",
                style("fsd import item parts.csv").yellow()
            );
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} fsd project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!("Use {} to reinitialize", style("fsd init --force").yellow());
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
