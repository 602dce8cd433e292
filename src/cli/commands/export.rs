//! `fsd export` command - write matching records as CSV

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::args::ResourceKind;
use crate::cli::helpers::Context;
use crate::cli::GlobalOpts;
use crate::core::engine::ListQueryEngine;
use crate::core::export::export;
use crate::core::query::{FilterSpec, Predicate, SearchSpec, SortSpec};

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Resource to export
    #[arg(value_enum)]
    pub resource: ResourceKind,

    /// Filter expression (repeatable), same syntax as `list --filter`
    #[arg(long = "filter", short = 'F')]
    pub filters: Vec<Predicate>,

    /// Free-text search
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Sort order (default: number)
    #[arg(long)]
    pub sort: Option<SortSpec>,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let schema = args.resource.schema();
    let engine = ListQueryEngine::new(&ctx.store, schema).with_max_page_size(ctx.config.max_page_size());

    let filter = FilterSpec {
        predicates: args.filters,
    };
    let search = args.search.map(SearchSpec::new);
    let sort = args.sort.unwrap_or_else(|| SortSpec::asc("number"));

    let written = match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path).into_diagnostic()?;
            export(&engine, &ctx.tenant, &filter, search.as_ref(), Some(&sort), file)?
        }
        None => export(
            &engine,
            &ctx.tenant,
            &filter,
            search.as_ref(),
            Some(&sort),
            std::io::stdout().lock(),
        )?,
    };

    if let Some(path) = &args.output {
        if !global.quiet {
            println!(
                "{} Exported {} {} to {}",
                style("✓").green(),
                style(written).cyan(),
                schema.name_plural,
                style(path.display()).cyan()
            );
        }
    }
    Ok(())
}
