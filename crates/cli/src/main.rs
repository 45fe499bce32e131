//! AgentBus CLI entry point.
//!
//! Commands:
//! - `onboard`  Initialize config & workspace
//! - `run`      Send one request through the agent bus
//! - `parse`    Show the action blocks in a file of model output
//! - `workflow` Run the mobile app builder workflow
//! - `doctor`   Diagnose configuration and workspace

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "agentbus",
    about = "AgentBus: multi-agent orchestration for AI code editing",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.agentbus/config.toml
    #[arg(short, long, global = true, env = "AGENTBUS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Send a prompt to the generative agent and print the result
    Run {
        /// What to build or change
        prompt: String,

        /// Workspace root (defaults to the configured root, else the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Approve every write, delete and command without asking
        #[arg(short, long)]
        yes: bool,

        /// Give up after this many seconds (0 waits forever)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Parse action blocks from a file of model output
    Parse {
        /// File to read (`-` for stdin)
        file: PathBuf,
    },

    /// Run the mobile app builder workflow
    Workflow {
        /// Name of the app to plan and build
        app_name: String,

        /// Target platform
        #[arg(short, long, default_value = "React Native")]
        platform: String,
    },

    /// Diagnose configuration and workspace
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Run {
            prompt,
            workspace,
            yes,
            timeout,
        } => {
            let options = commands::run::RunOptions {
                workspace,
                yes,
                timeout,
            };
            commands::run::run(config_path, &prompt, options).await?
        }
        Commands::Parse { file } => commands::parse::run(&file).await?,
        Commands::Workflow { app_name, platform } => {
            commands::workflow::run(config_path, &app_name, &platform, cli.verbose).await?
        }
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "agentbus", "run", "add a footer", "--yes", "-t", "30", "--workspace", "/tmp/w",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                prompt,
                workspace,
                yes,
                timeout,
            } => {
                assert_eq!(prompt, "add a footer");
                assert_eq!(workspace, Some(PathBuf::from("/tmp/w")));
                assert!(yes);
                assert_eq!(timeout, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["agentbus", "doctor", "-v", "--config", "a.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
    }

    #[test]
    fn workflow_platform_defaults() {
        let cli = Cli::try_parse_from(["agentbus", "workflow", "Notes"]).unwrap();
        match cli.command {
            Commands::Workflow { app_name, platform } => {
                assert_eq!(app_name, "Notes");
                assert_eq!(platform, "React Native");
            }
            _ => panic!("expected workflow"),
        }
    }
}
