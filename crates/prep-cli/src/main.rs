//! prep CLI - main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "prep")]
#[command(version)]
#[command(about = "Compile and run prep templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template if needed and write its output to stdout
    Run {
        /// Template name, relative to the current directory
        name: String,

        /// Parameters as KEY=VALUE; anything else is ignored
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        params: Vec<String>,
    },

    /// Compile template files, directories or patterns
    Compile {
        /// Rebuild even when the persisted artifact is current
        #[arg(short, long)]
        force: bool,

        /// Report each template compiled
        #[arg(short, long)]
        verbose: bool,

        /// Also write the generated code next to each template
        #[arg(short = 'p', long = "print")]
        print: bool,

        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },

    /// Delete artifacts derived from the templates under directories
    Clean {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Run template text read from stdin
    Stdin {
        /// Parameters as KEY=VALUE; anything else is ignored
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        params: Vec<String>,
    },

    /// `prep <name> [KEY=VALUE...]` is shorthand for `prep run`
    #[command(external_subcommand)]
    Bare(Vec<String>),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "prep=debug" } else { "prep=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Compile { verbose: true, .. });
    init_logging(verbose);

    match cli.command {
        Commands::Run { name, params } => commands::run(&name, &params),
        Commands::Compile {
            force,
            print,
            targets,
            ..
        } => commands::compile(&targets, force, print),
        Commands::Clean { dirs } => commands::clean(&dirs),
        Commands::Stdin { params } => commands::stdin(&params),
        Commands::Bare(args) => match args.split_first() {
            Some((name, params)) => commands::run(name, params),
            None => Ok(()),
        },
    }
}
