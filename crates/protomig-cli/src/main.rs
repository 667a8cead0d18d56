use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use protomig::{MigrateOptions, PgDatabase, load_declared, migrate_source};
use std::process::ExitCode;
use tracing::{error, info};

mod config;
mod output;

/// Reconcile protobuf message declarations with a live Postgres schema.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Configuration file, by default .config/protomig.toml in the current
    /// directory or any parent
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Treat unparseable declaration lines as errors
    #[clap(long, global = true)]
    strict: bool,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Apply schema changes for every source file (the default)
    Migrate,
    /// Show the changes each source file needs, without applying them
    Diff,
    /// Print the tables declared by each source file (no database needed)
    Schema,
}

/// Exit code for configuration and connection failures.
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("protomig=info")),
        )
        .init();

    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        error!(error = %e, "failed to load .env");
    }

    run(cli).await
}

async fn run(cli: Cli) -> ExitCode {
    let command = cli.command.unwrap_or(Commands::Migrate);

    let settings = match config::load(cli.config.as_deref().map(Utf8Path::new)) {
        Ok(settings) => settings,
        Err(e) => return fatal(&e),
    };
    let strict = cli.strict || settings.strict;

    let sources = match proto_sources(&settings.proto_dir) {
        Ok(sources) => sources,
        Err(e) => {
            return fatal(&format!(
                "cannot read proto directory {}: {}",
                settings.proto_dir, e
            ));
        }
    };
    if sources.is_empty() {
        info!(dir = %settings.proto_dir, "no .proto files found");
        return ExitCode::SUCCESS;
    }

    if command == Commands::Schema {
        return print_schemas(&sources, strict);
    }

    info!(
        database = %config::mask_password(&settings.database_url),
        schema = %settings.schema,
        "connecting"
    );
    let mut db = match PgDatabase::connect(&settings.database_url, settings.schema.clone()).await {
        Ok(db) => db,
        Err(e) => return fatal(&e),
    };

    let options = MigrateOptions {
        sql_dir: Some(settings.sql_dir.clone()),
        strict,
        dry_run: command == Commands::Diff,
    };

    let mut failed = 0usize;
    for path in &sources {
        match migrate_source(&mut db, path, &options).await {
            Ok(outcome) => output::print_outcome(path, &outcome),
            Err(e) => {
                failed += 1;
                error!(file = %path, error = %e, "migration failed");
                eprintln!("{} {}: {}", "✗".red(), path, e);
            }
        }
    }

    if failed > 0 {
        error!(failed, total = sources.len(), "some source files failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_schemas(sources: &[Utf8PathBuf], strict: bool) -> ExitCode {
    let mut failed = false;
    for path in sources {
        match load_declared(path, strict) {
            Ok(schema) => output::print_schema(path, &schema),
            Err(e) => {
                failed = true;
                error!(file = %path, error = %e, "cannot load declarations");
                eprintln!("{} {}: {}", "✗".red(), path, e);
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn fatal(e: &dyn std::fmt::Display) -> ExitCode {
    error!(error = %e, "fatal");
    eprintln!("{} {}", "error:".red().bold(), e);
    ExitCode::from(EXIT_FATAL)
}

/// The `*.proto` files directly inside `dir`, sorted by file name.
fn proto_sources(dir: &Utf8Path) -> std::io::Result<Vec<Utf8PathBuf>> {
    let mut sources = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();
        if path.extension() == Some("proto") && entry.file_type()?.is_file() {
            sources.push(path.to_owned());
        }
    }
    sources.sort();
    Ok(sources)
}
