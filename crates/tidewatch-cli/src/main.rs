//! tidewatch — traffic-driven capacity agent and HTTP load generator.
//!
//! # Usage
//!
//! ```text
//! tidewatch group init web --min 1 --max 4
//! tidewatch ingest app/web-alb/50dc6c495c0c9188 1500
//! tidewatch agent --group web --load-balancer app/web-alb/50dc6c495c0c9188
//! tidewatch load web-alb.example.com 50 --duration 300
//! ```

use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "tidewatch",
    about = "Traffic-driven capacity agent and HTTP load generator",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a load balancer's request rate and adjust a capacity group.
    Agent(commands::agent::AgentArgs),
    /// Send HTTP GET traffic at a target aggregate rate.
    Load(commands::load::LoadArgs),
    /// Manage capacity groups in the local store.
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },
    /// Record a request-count datapoint for a load balancer.
    Ingest(commands::ingest::IngestArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent(args) => {
            // Resolve first so a bad configuration fails before anything
            // is opened or logged.
            let config = args.resolve()?;
            logging::init(config.log_file.as_deref())?;
            commands::agent::run(config).await
        }
        Commands::Load(args) => {
            let config = args.resolve()?;
            logging::init(None)?;
            commands::load::run(config).await
        }
        Commands::Group { action } => {
            logging::init(None)?;
            commands::group::run(action)
        }
        Commands::Ingest(args) => {
            logging::init(None)?;
            commands::ingest::run(args)
        }
    }
}
