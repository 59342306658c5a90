mod commands;
mod session;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tidepool_core::{Command, TidepoolError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tide")]
#[command(about = "Droplet lifecycle and quota management for DigitalOcean", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a droplet
    Create {
        /// Droplet name
        name: String,
        /// Scope the droplet is billed to
        #[arg(long, env = "TIDE_SCOPE", default_value = "default")]
        scope: String,
        /// Region slug (e.g., ams3)
        #[arg(short, long)]
        region: String,
        /// Image slug (e.g., ubuntu-24-04-x64)
        #[arg(short, long)]
        image: String,
        /// Size slug (e.g., s-2vcpu-2gb)
        #[arg(short, long)]
        size: String,
        /// SSH key id or fingerprint
        #[arg(short = 'k', long)]
        ssh_key: Option<String>,
    },
    /// Destroy a droplet and release its quota
    Delete {
        /// Droplet name or id
        droplet: String,
    },
    /// Power a droplet on
    Start {
        /// Droplet name or id
        droplet: String,
    },
    /// Power a droplet off
    Stop {
        /// Droplet name or id
        droplet: String,
    },
    /// Reboot a droplet
    Restart {
        /// Droplet name or id
        droplet: String,
    },
    /// Resize a powered-off droplet
    Resize {
        /// Droplet name or id
        droplet: String,
        /// Target size slug
        #[arg(short, long)]
        size: String,
        /// Resize the disk too (permanent, cannot be reverted)
        #[arg(long)]
        disk: bool,
    },
    /// Refresh runtime states from the provider
    Sync {
        /// Droplet name or id (all droplets if omitted)
        droplet: Option<String>,
    },
    /// List droplets
    List {
        /// Only droplets of this scope
        #[arg(long, env = "TIDE_SCOPE")]
        scope: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one droplet
    Show {
        /// Droplet name or id
        droplet: String,
    },
    /// Show quota usage and limits
    Quota {
        /// Only this scope
        #[arg(long, env = "TIDE_SCOPE")]
        scope: Option<String>,
    },
    /// List the configured regions, images and sizes
    Catalog,
    /// Check provider credentials
    Auth,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr, stdout is for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli.command).await {
        match err.downcast_ref::<TidepoolError>() {
            Some(e) => eprintln!("{} [{}] {}", "Error:".red().bold(), e.status_code(), e),
            None => eprintln!("{} {:#}", "Error:".red().bold(), err),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Create {
            name,
            scope,
            region,
            image,
            size,
            ssh_key,
        } => {
            commands::create::handle(commands::create::CreateArgs {
                name,
                scope,
                region,
                image,
                size,
                ssh_key,
            })
            .await
        }
        Commands::Delete { droplet } => commands::delete::handle(droplet).await,
        Commands::Start { droplet } => commands::power::handle(droplet, Command::Start).await,
        Commands::Stop { droplet } => commands::power::handle(droplet, Command::Stop).await,
        Commands::Restart { droplet } => {
            commands::power::handle(droplet, Command::Restart).await
        }
        Commands::Resize {
            droplet,
            size,
            disk,
        } => commands::resize::handle(droplet, size, disk).await,
        Commands::Sync { droplet } => commands::sync::handle(droplet).await,
        Commands::List { scope, json } => commands::list::handle(scope, json).await,
        Commands::Show { droplet } => commands::show::handle(droplet).await,
        Commands::Quota { scope } => commands::quota::handle(scope).await,
        Commands::Catalog => commands::catalog::handle(),
        Commands::Auth => commands::auth::handle().await,
        Commands::Version => {
            println!("tidepool {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
