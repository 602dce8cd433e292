use clap::Parser;
use miette::Result;
use fsd::cli::commands::{completions, export, import, init, resource, stock, summary};
use fsd::cli::{logging, Cli, Commands};
use fsd::entities::{inventory, invoice, purchase_order, transaction, vehicle};

fn main() -> Result<()> {
    // Reset SIGPIPE so piping into `head` exits quietly instead of panicking.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    logging::init(&global);

    match cli.command {
        Commands::Init(args) => init::run(args),
        Commands::Vehicle(cmd) => resource::run(cmd, &vehicle::SCHEMA, &global),
        Commands::Item(cmd) => resource::run(cmd, &inventory::SCHEMA, &global),
        Commands::Po(cmd) => resource::run(cmd, &purchase_order::SCHEMA, &global),
        Commands::Invoice(cmd) => resource::run(cmd, &invoice::SCHEMA, &global),
        Commands::Txn(cmd) => resource::run(cmd, &transaction::SCHEMA, &global),
        Commands::Import(args) => import::run(args, &global),
        Commands::Export(args) => export::run(args, &global),
        Commands::Stock(cmd) => stock::run(cmd, &global),
        Commands::Summary(args) => summary::run(args, &global),
        Commands::Completions(args) => completions::run(args),
    }
}
