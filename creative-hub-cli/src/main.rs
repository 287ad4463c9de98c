mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;
use creative_hub_core::models::LogLevel;
use creative_hub_core::services::init_logging;

#[derive(Parser, Debug)]
#[command(name = "creative-hub")]
#[command(version)]
#[command(about = "Creative workflow hub: story → script → config → character → storyboard → edit")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the creative hub HTTP server
    ///
    /// Examples:
    ///   creative-hub serve
    ///   creative-hub serve --host 0.0.0.0 --port 9000
    Serve {
        /// Server bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Server port number (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to configuration file (default: <config dir>/creative-hub/config.toml)
        #[arg(long, default_value = "")]
        config: String,
    },

    /// Show the effective configuration, or write it with --init
    Config {
        /// Write the configuration file (defaults when it does not exist yet)
        #[arg(long)]
        init: bool,

        /// Path to configuration file
        #[arg(long, default_value = "")]
        config_file: String,
    },

    /// List the six workflow stages
    Stages {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Step pipelines on a running server
    Pipeline {
        #[command(subcommand)]
        command: cli::pipeline::PipelineCommands,
    },

    /// Six-stage creative sessions
    ///
    /// Sessions are kept in a local snapshot file unless --server is given.
    ///
    /// Examples:
    ///   creative-hub session start "一个少年在森林中发现了一只会说话的狐狸"
    ///   creative-hub session confirm
    ///   creative-hub session modify "更温馨一些"
    ///   creative-hub session jump story --json
    Session {
        #[command(subcommand)]
        command: cli::session::SessionCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve { .. }) {
        init_logging(LogLevel::Warn)?;
    }

    match cli.command {
        Commands::Serve { host, port, config } => {
            handlers::handle_serve(host, port, config).await?;
        }
        Commands::Config { init, config_file } => {
            handlers::handle_config(init, config_file).await?;
        }
        Commands::Stages { json } => {
            handlers::handle_stages(json).await?;
        }
        Commands::Pipeline { command } => {
            cli::pipeline_handlers::handle_pipeline_commands(command).await?;
        }
        Commands::Session { command } => {
            cli::session_handlers::handle_session_commands(command).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli::pipeline::PipelineCommands;
    use cli::session::SessionCommands;
    use creative_hub_core::models::StageId;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["creative-hub", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port, config } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
                assert!(config.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_step() {
        let cli = Cli::try_parse_from([
            "creative-hub",
            "pipeline",
            "step",
            "workflow-1",
            "step-1",
            "--input",
            r#"{"prompt":"cat"}"#,
            "--server",
            "http://localhost:9000",
        ])
        .unwrap();
        match cli.command {
            Commands::Pipeline {
                command:
                    PipelineCommands::Step {
                        id,
                        step,
                        input,
                        server,
                        json,
                    },
            } => {
                assert_eq!(id, "workflow-1");
                assert_eq!(step, "step-1");
                assert_eq!(input.as_deref(), Some(r#"{"prompt":"cat"}"#));
                assert_eq!(server, "http://localhost:9000");
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_optimize() {
        let cli = Cli::try_parse_from(["creative-hub", "pipeline", "optimize", "a cat"]).unwrap();
        match cli.command {
            Commands::Pipeline {
                command:
                    PipelineCommands::Optimize {
                        prompt,
                        config_file,
                        server,
                    },
            } => {
                assert_eq!(prompt, "a cat");
                assert!(config_file.is_empty());
                assert!(server.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_session_jump_accepts_alias() {
        let cli = Cli::try_parse_from(["creative-hub", "session", "jump", "shots", "--json"]).unwrap();
        match cli.command {
            Commands::Session {
                command: SessionCommands::Jump { stage, json, .. },
            } => {
                assert_eq!(stage, StageId::Storyboard);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_stage() {
        assert!(Cli::try_parse_from(["creative-hub", "session", "jump", "teleport"]).is_err());
    }

    #[test]
    fn test_parse_session_modify_with_id() {
        let id = uuid::Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from([
            "creative-hub",
            "session",
            "modify",
            "更温馨一些",
            "--session",
            id.as_str(),
        ])
        .unwrap();
        match cli.command {
            Commands::Session {
                command: SessionCommands::Modify { note, session, .. },
            } => {
                assert_eq!(note, "更温馨一些");
                assert_eq!(session.map(|s| s.to_string()), Some(id));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
