use anyhow::Result;
use clap::{Parser, Subcommand};
use ecsdeploy_config::{LoggingConfig, StdEnvSource};
use std::path::PathBuf;

/// Synthesize the ECS deploy stack as Terraform JSON
#[derive(Parser)]
#[command(name = "ecsdeploy")]
#[command(version)]
#[command(about = "Synthesize the ECS deploy stack as Terraform JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the stack and write main.tf.json
    Synth {
        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = ecsdeploy::DEFAULT_OUT_DIR)]
        out: PathBuf,
    },
    /// Print each declaration and the addresses it references
    Graph,
    /// Validate the configuration and assemble without writing
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing comes up first so warnings raised while loading are kept
    let mut logging = LoggingConfig::from_env(&StdEnvSource)?;
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    let log_handle = ecsdeploy::init_tracing(&logging);

    let config = ecsdeploy::load_config(cli.config.as_deref())?;
    if cli.log_level.is_none() && config.logging.level != logging.level {
        log_handle.set_level(&config.logging.level);
    }

    match cli.command {
        Commands::Synth { out } => {
            let path = ecsdeploy::synth(&config, &out)?;
            println!("{}", path.display());
        }
        Commands::Graph => print!("{}", ecsdeploy::render_graph(&config)?),
        Commands::Validate => {
            let declarations = ecsdeploy::validate(&config)?;
            println!("ok: {} declarations", declarations);
        }
    }
    Ok(())
}
