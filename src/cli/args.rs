//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, export::ExportArgs, import::ImportArgs, init::InitArgs,
    resource::ResourceCommands, stock::StockCommands, summary::SummaryArgs,
};
use crate::core::identity::EntityPrefix;
use crate::core::schema::ResourceSchema;
use crate::entities::schema_for;

#[derive(Parser)]
#[command(name = "fsd")]
#[command(author, version, about = "Field Service Desk")]
#[command(long_about = "Multi-tenant records for a field-service business: fleet vehicles, inventory, purchase orders and invoices.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Tenant whose records are read and written (default: config or FSD_TENANT)
    #[arg(long, short = 't', global = true)]
    pub tenant: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .fsd/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new fsd project
    Init(InitArgs),

    /// Fleet vehicle management
    #[command(subcommand, visible_alias = "veh")]
    Vehicle(ResourceCommands),

    /// Inventory item management
    #[command(subcommand)]
    Item(ResourceCommands),

    /// Purchase order management
    #[command(subcommand)]
    Po(ResourceCommands),

    /// Invoice management
    #[command(subcommand, visible_alias = "inv")]
    Invoice(ResourceCommands),

    /// Inventory transaction history
    #[command(subcommand)]
    Txn(ResourceCommands),

    /// Bulk-import records from a CSV file
    Import(ImportArgs),

    /// Export records to CSV
    Export(ExportArgs),

    /// Stock movements on inventory items
    #[command(subcommand)]
    Stock(StockCommands),

    /// Inventory, fleet and invoice totals
    Summary(SummaryArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Resource selector for commands that take one as an argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    #[value(alias = "veh")]
    Vehicle,
    Item,
    Po,
    #[value(alias = "inv")]
    Invoice,
    Txn,
}

impl ResourceKind {
    pub fn prefix(self) -> EntityPrefix {
        match self {
            ResourceKind::Vehicle => EntityPrefix::Veh,
            ResourceKind::Item => EntityPrefix::Item,
            ResourceKind::Po => EntityPrefix::Po,
            ResourceKind::Invoice => EntityPrefix::Inv,
            ResourceKind::Txn => EntityPrefix::Txn,
        }
    }

    pub fn schema(self) -> &'static ResourceSchema {
        schema_for(self.prefix())
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}

impl OutputFormat {
    /// Resolve `Auto` to a concrete format
    pub fn or(self, fallback: OutputFormat) -> OutputFormat {
        match self {
            OutputFormat::Auto => fallback,
            f => f,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <OutputFormat as ValueEnum>::from_str(s, true)
    }
}
