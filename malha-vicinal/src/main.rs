//! Point d'entrée CLI pour malha-vicinal

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use malha_vicinal::cli::{self, Commands};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Extraire la malha vicinal et calculer les indicateurs de densité
#[derive(Parser)]
#[command(name = "malha-vicinal")]
#[command(author, version)]
#[command(about = "Extract the vicinal road network and compute municipal and regional density indicators")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => {
            info!(output = %args.output.display(), config = %args.roads.config, "Starting run");
            cli::cmd_run(&args)?;
        }
        Commands::Subtract(args) => {
            info!(output = %args.output.display(), config = %args.roads.config, "Starting subtraction");
            cli::cmd_subtract(&args)?;
        }
        Commands::Stats(args) => {
            info!(input = %args.input.display(), "Computing segment statistics");
            cli::cmd_stats(&args)?;
        }
        Commands::Validate { dir } => {
            let report = cli::cmd_validate(&dir)?;
            if !report.passed() {
                anyhow::bail!(
                    "Totals validation failed: {} of {} checks",
                    report.failures().count(),
                    report.checks.len()
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
