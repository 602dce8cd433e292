//! `fsd import` command - bulk-import records from CSV
//!
//! Rows are validated first and reported by line. Valid rows are then
//! inserted in batches; a failed batch does not undo batches already saved,
//! and the command exits non-zero unless every row was imported.

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::cli::args::ResourceKind;
use crate::cli::helpers::Context;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::import::{BulkImporter, ImportReport, ParsedImport, RejectedRow};

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Resource to import into
    #[arg(value_enum)]
    pub resource: ResourceKind,

    /// CSV file with a header row (use `-` for stdin)
    pub file: PathBuf,

    /// Validate and report without saving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Rows per insert batch (default from config)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

fn read_input(path: &Path) -> Result<(String, String)> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut raw).into_diagnostic()?;
        return Ok(("<stdin>".to_string(), raw));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("cannot read {}: {}", path.display(), e))?;
    Ok((path.display().to_string(), raw))
}

pub fn run(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let schema = args.resource.schema();
    if schema.prefix == crate::core::identity::EntityPrefix::Txn {
        return Err(miette::miette!(
            help = "inventory transactions are recorded by `fsd stock`",
            "cannot import inventory transactions"
        ));
    }

    let (name, raw) = read_input(&args.file)?;
    let batch_size = args.batch_size.unwrap_or_else(|| ctx.config.import_batch_size());
    let mut importer = BulkImporter::new(&ctx.store, schema)
        .with_batch_size(batch_size)
        .with_source_name(name);

    let parsed = importer.parse(&raw)?;
    let json = ctx.format(global, OutputFormat::Auto) == OutputFormat::Json;

    if args.dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&parsed).into_diagnostic()?);
        } else if !global.quiet {
            print_review(&parsed, schema.name_plural);
        }
        return Ok(());
    }

    let quiet = global.quiet || json;
    let report = importer.submit(&ctx.tenant, &parsed, |progress| {
        if !quiet {
            eprint!(
                "\r{} {}/{} rows",
                style("importing").dim(),
                progress.completed_rows,
                progress.total_rows
            );
        }
    })?;
    if !quiet && !parsed.accepted.is_empty() {
        eprintln!();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else if !global.quiet {
        print_report(&report, schema.name_plural);
    }

    report.ensure_complete()?;
    Ok(())
}

fn print_rejections(title: &str, rows: &[RejectedRow]) {
    if rows.is_empty() {
        return;
    }
    println!("{}", style(title).yellow().bold());
    for row in rows {
        println!("  line {:>4}: {}", style(row.line).cyan(), row.reason);
    }
}

fn print_review(parsed: &ParsedImport, plural: &str) {
    println!(
        "{} {} row(s) ready to import, {} rejected (dry run, nothing saved)",
        style("✓").green(),
        style(parsed.accepted.len()).cyan(),
        style(parsed.rejected.len()).cyan()
    );
    if !parsed.ignored_headers.is_empty() {
        println!(
            "{} ignored column(s) not used by {}: {}",
            style("!").yellow(),
            plural,
            parsed.ignored_headers.join(", ")
        );
    }
    print_rejections("Rejected rows:", &parsed.rejected);
}

fn print_report(report: &ImportReport, plural: &str) {
    let mark = if report.not_imported() == 0 {
        style("✓").green()
    } else {
        style("!").yellow()
    };
    println!(
        "{} Imported {} {}, {} row(s) not imported",
        mark,
        style(report.committed.len()).cyan(),
        plural,
        style(report.not_imported()).cyan()
    );
    if !report.ignored_headers.is_empty() {
        println!("  ignored column(s): {}", report.ignored_headers.join(", "));
    }
    for batch in report.batches.iter().filter(|b| !b.committed) {
        println!(
            "  {} batch {} (lines {}-{}) was not saved",
            style("✗").red(),
            batch.batch,
            batch.first_line,
            batch.last_line
        );
    }
    print_rejections("Rejected rows:", &report.rejected);
    print_rejections("Failed rows:", &report.failed);
}
