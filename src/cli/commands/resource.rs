//! `fsd <resource>` commands - list, create, show, edit and delete records
//!
//! The same subcommands serve every resource; the resource's schema decides
//! which fields exist and how they parse.

use clap::Subcommand;
use console::style;
use dialoguer::{Confirm, Input};
use miette::{miette, IntoDiagnostic, Result};

use crate::cli::helpers::{parse_assignments, Context};
use crate::cli::table::RecordTable;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::engine::ListQueryEngine;
use crate::core::identity::EntityPrefix;
use crate::core::import::template;
use crate::core::mutator::{FormMutator, Payload};
use crate::core::query::{FilterSpec, PageRequest, Predicate, SearchSpec, SortSpec};
use crate::core::record::Record;
use crate::core::refine::{ClientSideRefiner, Refinement};
use crate::core::schema::ResourceSchema;

#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    /// List records with filtering, search, sorting and paging
    List(ListArgs),

    /// Create a record
    New(NewArgs),

    /// Show a record's details
    Show(ShowArgs),

    /// Change fields of a record
    Edit(EditArgs),

    /// Delete a record
    Delete(DeleteArgs),

    /// Print a CSV import template
    Template,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter: field=value, field>=min, field<=max, field=min..max, field~text (repeatable)
    #[arg(long = "filter", short = 'F')]
    pub filters: Vec<Predicate>,

    /// Free-text search over the resource's searchable fields
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Restrict search to these fields (comma-separated)
    #[arg(long, value_delimiter = ',', requires = "search")]
    pub search_in: Vec<String>,

    /// Sort by field: name, -name, or name:desc (default: -created)
    #[arg(long)]
    pub sort: Option<SortSpec>,

    /// Page number, starting at 1
    #[arg(long, short = 'p', default_value_t = 1)]
    pub page: u32,

    /// Records per page (default from config)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Fetch every page instead of one
    #[arg(long, conflicts_with = "page")]
    pub all: bool,

    /// Filter on any field, computed fields included, applied to the fetched page only
    #[arg(long = "refine")]
    pub refine: Vec<Predicate>,

    /// Re-sort the fetched page, computed fields included
    #[arg(long)]
    pub refine_sort: Option<SortSpec>,

    /// Columns to display (comma-separated; default depends on resource)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Show only the total count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Field values as field=value (repeatable)
    #[arg(long = "set", short = 'S')]
    pub values: Vec<String>,

    /// Interactive mode (prompt for each field)
    #[arg(long, short = 'i')]
    pub interactive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Record ID or number (e.g. ITEM-000042)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Record ID or number
    pub id: String,

    /// Field values as field=value (repeatable); an empty value clears an optional field
    #[arg(long = "set", short = 'S', required = true)]
    pub values: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Record ID or number
    pub id: String,

    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run a resource subcommand
pub fn run(cmd: ResourceCommands, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ResourceCommands::List(args) => run_list(args, schema, global),
        ResourceCommands::New(args) => run_new(args, schema, global),
        ResourceCommands::Show(args) => run_show(args, schema, global),
        ResourceCommands::Edit(args) => run_edit(args, schema, global),
        ResourceCommands::Delete(args) => run_delete(args, schema, global),
        ResourceCommands::Template => {
            print!("{}", template(schema).into_diagnostic()?);
            Ok(())
        }
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn engine<'a>(ctx: &'a Context, schema: &'static ResourceSchema) -> ListQueryEngine<'a> {
    ListQueryEngine::new(&ctx.store, schema).with_max_page_size(ctx.config.max_page_size())
}

fn find(ctx: &Context, schema: &'static ResourceSchema, reference: &str) -> Result<Record> {
    engine(ctx, schema)
        .find(&ctx.tenant, reference)?
        .ok_or_else(|| miette!(code = "fsd::not_found", "{} not found: {}", schema.name, reference))
}

/// Inventory transactions are an audit trail written by `fsd stock`
fn ensure_writable(schema: &'static ResourceSchema) -> Result<()> {
    if schema.prefix == EntityPrefix::Txn {
        return Err(miette!(
            help = "use `fsd stock adjust` or `fsd stock set` to move stock",
            "inventory transactions cannot be changed directly"
        ));
    }
    Ok(())
}

fn run_list(args: ListArgs, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let engine = engine(&ctx, schema);

    let filter = FilterSpec {
        predicates: args.filters,
    };
    let search = args.search.map(|term| SearchSpec {
        term,
        fields: args.search_in,
    });
    let page_size = args.page_size.unwrap_or_else(|| ctx.config.default_page_size());

    let (records, total, page) = if args.all {
        let records = engine.fetch_all(&ctx.tenant, &filter, search.as_ref(), args.sort.as_ref())?;
        let total = records.len() as u64;
        (records, total, None)
    } else {
        let page = PageRequest::new(args.page, page_size);
        let result = engine.query(&ctx.tenant, &filter, search.as_ref(), args.sort.as_ref(), page)?;
        let total = result.total_count;
        let pages = result.total_pages();
        let has_next = result.has_next();
        (result.records, total, Some((page.page, pages, has_next)))
    };

    if args.count {
        println!("{}", total);
        return Ok(());
    }

    let refinement = Refinement {
        filter: args.refine,
        search: None,
        sort: args.refine_sort,
    };
    let records = if refinement.is_empty() {
        records
    } else {
        if let Some((_, _, true)) = page {
            if !global.quiet {
                eprintln!(
                    "{} --refine only covers page {} of the results",
                    style("note:").yellow(),
                    args.page
                );
            }
        }
        ClientSideRefiner::new(schema, today()).refine(&records, &refinement)?
    };

    let format = ctx.format(global, OutputFormat::Auto);
    if records.is_empty() && format == OutputFormat::Auto {
        if !global.quiet {
            println!("No {} found.", schema.name_plural);
        }
        return Ok(());
    }

    let columns: Vec<&str> = args.columns.iter().map(|c| c.as_str()).collect();
    let table = RecordTable::new(schema, today()).with_columns(&columns);
    print!("{}", table.render(&records, format)?);

    if format == OutputFormat::Auto && !global.quiet {
        match page {
            Some((number, pages, _)) => println!(
                "{} of {} {} (page {} of {})",
                style(records.len()).cyan(),
                style(total).cyan(),
                schema.name_plural,
                number,
                pages.max(1)
            ),
            None => println!("{} {}", style(records.len()).cyan(), schema.name_plural),
        }
    }
    Ok(())
}

fn prompt_payload(schema: &'static ResourceSchema) -> Result<Payload> {
    let mut payload = Payload::new();
    for field in schema.fields {
        let mut prompt = format!("{} ({})", field.name, field.kind.as_str());
        if !field.choices.is_empty() {
            prompt = format!("{} [{}]", prompt, field.choices.join("/"));
        }
        let value: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(!field.required)
            .interact_text()
            .into_diagnostic()?;
        payload.insert(field.name.to_string(), value);
    }
    Ok(payload)
}

fn run_new(args: NewArgs, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    ensure_writable(schema)?;
    let ctx = Context::open(global)?;

    let mut payload = if args.interactive {
        prompt_payload(schema)?
    } else {
        Payload::new()
    };
    payload.extend(parse_assignments(&args.values)?);

    let record = FormMutator::new(&ctx.store, schema).create(&ctx.tenant, &payload)?;
    report_saved(&record, "Created", schema, global)
}

fn run_show(args: ShowArgs, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let record = find(&ctx, schema, &args.id)?;
    let format = ctx.format(global, OutputFormat::Yaml);
    print!("{}", RecordTable::new(schema, today()).render_one(&record, format)?);
    Ok(())
}

fn run_edit(args: EditArgs, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    ensure_writable(schema)?;
    let ctx = Context::open(global)?;
    let existing = find(&ctx, schema, &args.id)?;
    let payload = parse_assignments(&args.values)?;

    let record = FormMutator::new(&ctx.store, schema).update(&ctx.tenant, &existing.id, &payload)?;
    report_saved(&record, "Updated", schema, global)
}

fn run_delete(args: DeleteArgs, schema: &'static ResourceSchema, global: &GlobalOpts) -> Result<()> {
    ensure_writable(schema)?;
    let ctx = Context::open(global)?;
    let record = find(&ctx, schema, &args.id)?;

    if !args.yes {
        if !console::Term::stdout().is_term() {
            return Err(miette!(
                help = "pass --yes to delete without a prompt",
                "refusing to delete {} without confirmation",
                record.number
            ));
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete {} {}?", schema.name, record.number))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            return Ok(());
        }
    }

    FormMutator::new(&ctx.store, schema).delete(&ctx.tenant, &record.id)?;
    if !global.quiet {
        println!(
            "{} Deleted {} {}",
            style("✓").green(),
            schema.name,
            style(&record.number).cyan()
        );
    }
    Ok(())
}

fn report_saved(
    record: &Record,
    verb: &str,
    schema: &'static ResourceSchema,
    global: &GlobalOpts,
) -> Result<()> {
    match global.format {
        OutputFormat::Auto => {
            if !global.quiet {
                println!(
                    "{} {} {} {}",
                    style("✓").green(),
                    verb,
                    schema.name,
                    style(&record.number).cyan()
                );
                println!("   {}", style(&record.id).dim());
            }
        }
        format => print!("{}", RecordTable::new(schema, today()).render_one(record, format)?),
    }
    Ok(())
}
