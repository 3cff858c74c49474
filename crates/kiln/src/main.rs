//! Kiln CLI - static site build pipeline with live reload.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Build static sites from templates, scripts, styles and assets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to config file, relative to the root
    #[arg(short, long, global = true, default_value = "kiln.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Development mode: unminified output, lenient templates, live reload
    #[arg(long, global = true, env = "KILN_DEV")]
    dev: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean and build everything (the default)
    Build {
        /// Do not open a browser when serving in dev mode
        #[arg(long)]
        no_open: bool,
    },

    /// Build in dev mode, then serve and rebuild on change
    Serve {
        /// Port to listen on (defaults to config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Remove the output directory
    Clean,

    /// Scaffold a new project
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        None => {
            let config = commands::load_config(&cli.root, &cli.config, cli.dev)?;
            commands::build::run(config, true).await?;
        }
        Some(Commands::Build { no_open }) => {
            let config = commands::load_config(&cli.root, &cli.config, cli.dev)?;
            commands::build::run(config, !no_open).await?;
        }
        Some(Commands::Serve { port, no_open }) => {
            let config = commands::load_config(&cli.root, &cli.config, true)?;
            commands::serve::run(config, port, !no_open).await?;
        }
        Some(Commands::Clean) => {
            let config = commands::load_config(&cli.root, &cli.config, cli.dev)?;
            commands::clean::run(config).await?;
        }
        Some(Commands::Init { yes }) => {
            commands::init::run(&cli.root, &cli.config, yes)?;
        }
    }

    Ok(())
}
