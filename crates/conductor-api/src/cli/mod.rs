//! CLI command definitions and dispatch for the `cndr` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow operations live
//! under a noun subcommand (e.g., `cndr workflow execute <id>`).

pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run DAG workflows from templates or definition files.
#[derive(Parser)]
#[command(name = "cndr", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "CONDUCTOR_OTEL")]
    pub otel: bool,

    /// Keep all state in memory for this invocation only.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Workflow management (templates, create, execute, status, checkpoints).
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_workflow_command() {
        let cli = Cli::try_parse_from(["cndr", "--json", "workflow", "templates", "--category", "testing"])
            .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Workflow {
                action: workflow::WorkflowCommand::Templates { category: Some(_) }
            }
        ));
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["cndr", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, 3000);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }
}
