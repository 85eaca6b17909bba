use std::env;
use std::io;
use std::process::ExitCode;

use catalog::{Catalog, CatalogConfig};
use catalog_cli::{parse_args, run};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    init_tracing();
    let invocation = parse_args(&args)?;
    let config = match invocation.db {
        Some(path) => CatalogConfig::file(path),
        None => CatalogConfig::from_env().map_err(|error| error.to_string())?,
    };
    debug!(storage = ?config.storage, "catalog_cli_config_resolved");

    let catalog = Catalog::open(&config).map_err(|error| error.to_string())?;
    run(&catalog, invocation.command, &mut io::stdout())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "catalog_cli - inspect and seed a card catalog database",
        "",
        "Usage:",
        "  catalog_cli [--db <path>] games",
        "  catalog_cli [--db <path>] add-game <name> [--description <text>]",
        "  catalog_cli [--db <path>] delete-game <id>",
        "  catalog_cli [--db <path>] assets --game <id> [--query <text>]",
        "  catalog_cli [--db <path>] import-asset --game <id> <path> [--name <name>] [--type <mime>]",
        "  catalog_cli [--db <path>] export-asset --game <id> <name> <out>",
        "  catalog_cli [--db <path>] delete-asset --game <id> <asset-id>",
        "  catalog_cli [--db <path>] templates --game <id>",
        "  catalog_cli [--db <path>] cards --game <id>",
        "",
        "Defaults:",
        "  --db $CATALOG_DB_PATH, else catalog.db",
    ]
    .join("\n")
}
