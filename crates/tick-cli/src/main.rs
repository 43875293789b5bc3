use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tick_cli::cmd_reverse::Format;
use tick_cli::{Settings, cmd_classify, cmd_render, cmd_reverse};
use tick_tasks::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "tickforge", about = "Alert rule <-> TICKscript tooling")]
struct Cli {
    /// Path to tickforge.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the script generated for a rule
    Render {
        /// Rule file (TOML)
        #[arg(short, long)]
        rule: PathBuf,
    },
    /// Print the rule reconstructed from a script
    Reverse {
        /// Script file
        #[arg(short, long)]
        script: PathBuf,
        /// Emit JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Print whether a rule runs as a stream or a batch task
    Classify {
        /// Rule file (TOML)
        #[arg(short, long)]
        rule: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::resolve(cli.config.as_deref())?;
    let _guard = init_tracing(&settings.logging)?;

    match cli.command {
        Commands::Render { rule } => cmd_render::run(rule, settings.generator),
        Commands::Reverse { script, json } => {
            let format = if json { Format::Json } else { Format::Toml };
            cmd_reverse::run(script, format)
        }
        Commands::Classify { rule } => cmd_classify::run(rule),
    }
}
