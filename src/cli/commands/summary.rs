//! `fsd summary` command - tenant dashboard totals

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::Context;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::summary::{summarize, Summary};

#[derive(clap::Args, Debug)]
pub struct SummaryArgs {
    /// Compute date-based figures as of this date (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub as_of: Option<chrono::NaiveDate>,
}

pub fn run(args: SummaryArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let today = args.as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
    let summary = summarize(&ctx.store, &ctx.tenant, today)
        .map_err(|e| miette::miette!(code = "fsd::store_unavailable", "{}", e))?;

    match ctx.format(global, OutputFormat::Auto) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?),
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&summary).into_diagnostic()?),
        OutputFormat::Md => print!("{}", table(&summary, true)),
        _ => {
            println!(
                "{} {} as of {}",
                style("Summary for").bold(),
                style(&summary.tenant).cyan(),
                summary.as_of
            );
            print!("{}", table(&summary, false));
        }
    }
    Ok(())
}

fn table(summary: &Summary, markdown: bool) -> String {
    let mpg = summary
        .fleet
        .average_mpg
        .map_or_else(|| "-".to_string(), |m| format!("{:.1}", m));

    let mut builder = Builder::default();
    builder.push_record(["Metric", "Value"]);
    builder.push_record(["Inventory items".to_string(), summary.inventory.items.to_string()]);
    builder.push_record(["Inventory value".to_string(), format!("{:.2}", summary.inventory.total_value)]);
    builder.push_record(["Items to reorder".to_string(), summary.inventory.needs_reorder.to_string()]);
    builder.push_record(["Vehicles".to_string(), summary.fleet.vehicles.to_string()]);
    builder.push_record(["Active vehicles".to_string(), summary.fleet.active.to_string()]);
    builder.push_record(["Fleet average MPG".to_string(), mpg]);
    builder.push_record(["Service due".to_string(), summary.fleet.service_due.to_string()]);
    builder.push_record(["Outstanding invoices".to_string(), summary.invoices.outstanding.to_string()]);
    builder.push_record(["Outstanding total".to_string(), format!("{:.2}", summary.invoices.outstanding_total)]);
    builder.push_record(["Past due".to_string(), summary.invoices.past_due.to_string()]);

    let mut table = builder.build();
    if markdown {
        table.with(Style::markdown());
    } else {
        table.with(Style::psql());
    }
    format!("{}\n", table)
}
