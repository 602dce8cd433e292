//! `fsd stock` command - move inventory stock

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::Context;
use crate::cli::table::RecordTable;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::stock::{MovementNote, StockLedger};
use crate::core::store::StockMovement;
use crate::entities::transaction;

#[derive(Subcommand, Debug)]
pub enum StockCommands {
    /// Add to or remove from an item's quantity
    Adjust(AdjustArgs),

    /// Set an item's quantity after a count
    Set(SetArgs),

    /// Show an item's stock movements, newest first
    History(HistoryArgs),
}

#[derive(clap::Args, Debug)]
pub struct NoteArgs {
    /// Why the stock moved
    #[arg(long, short = 'r')]
    pub reason: Option<String>,

    /// Who moved it (default: configured author)
    #[arg(long)]
    pub by: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct AdjustArgs {
    /// Item ID or number (e.g. ITEM-000042)
    pub item: String,

    /// Signed change, e.g. 5 or -2
    #[arg(allow_negative_numbers = true)]
    pub delta: i64,

    #[command(flatten)]
    pub note: NoteArgs,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Item ID or number
    pub item: String,

    /// Counted quantity
    pub quantity: i64,

    #[command(flatten)]
    pub note: NoteArgs,
}

#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    /// Item ID or number
    pub item: String,
}

pub fn run(cmd: StockCommands, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let ledger = StockLedger::new(&ctx.store);
    let note = |args: NoteArgs| MovementNote {
        reason: args.reason,
        performed_by: Some(args.by.unwrap_or_else(|| ctx.config.author())),
    };

    match cmd {
        StockCommands::Adjust(args) => {
            let movement = ledger.adjust(&ctx.tenant, &args.item, args.delta, &note(args.note))?;
            report(&movement, global)
        }
        StockCommands::Set(args) => {
            let movement = ledger.set_quantity(&ctx.tenant, &args.item, args.quantity, &note(args.note))?;
            report(&movement, global)
        }
        StockCommands::History(args) => {
            let history = ledger.history(&ctx.tenant, &args.item)?;
            let format = ctx.format(global, OutputFormat::Auto);
            let today = chrono::Local::now().date_naive();
            let table = RecordTable::new(&transaction::SCHEMA, today).with_columns(&[
                "number",
                "created",
                "kind",
                "quantity",
                "reason",
                "performed_by",
            ]);
            print!("{}", table.render(&history, format)?);
            Ok(())
        }
    }
}

fn report(movement: &StockMovement, global: &GlobalOpts) -> Result<()> {
    if global.quiet {
        return Ok(());
    }
    let on_hand = movement
        .item
        .get("quantity")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let delta = movement
        .transaction
        .get("quantity")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    println!(
        "{} {} {:+} -> {} on hand ({})",
        style("✓").green(),
        style(&movement.item.number).cyan(),
        delta,
        style(on_hand).cyan(),
        style(&movement.transaction.number).dim()
    );
    Ok(())
}
