//! Quorum CLI — run, resume and inspect durable workflow executions.
//!
//! Reuses the same core engine (quorum-core) and server bootstrap
//! (quorum-server) that back the HTTP API.

mod commands;

use clap::{Parser, Subcommand};

/// Quorum CLI — durable, resumable agent workflows
#[derive(Parser)]
#[command(name = "quorum", version, about = "Quorum CLI — durable, resumable agent workflows")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "QUORUM_DB_PATH", default_value = "quorum.db")]
    db: String,

    /// Directory of extra specialist definitions (YAML or Markdown)
    #[arg(long, env = "QUORUM_SPECIALIST_DIR")]
    specialist_dir: Option<String>,

    /// YAML file declaring static or HTTP capabilities
    #[arg(long, env = "QUORUM_CAPABILITIES_FILE")]
    capabilities_file: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Quorum HTTP server
    Server {
        /// Host to bind to
        #[arg(long, env = "QUORUM_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "QUORUM_PORT", default_value_t = 3210)]
        port: u16,
    },

    /// Run and inspect workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Inspect the specialist roster
    Specialist {
        #[command(subcommand)]
        action: SpecialistAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List registered workflows
    List,
    /// Run a workflow on a JSON input
    Run {
        /// Workflow ID (e.g. "research-inquiry")
        workflow_id: String,
        /// Input as a JSON string
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Path to a JSON file holding the input
        #[arg(long)]
        input_file: Option<String>,
    },
    /// Resume a suspended execution
    Resume {
        /// Execution ID
        execution_id: String,
        /// Resume payload as a JSON string
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Show one execution, or recent executions when no ID is given
    Status {
        /// Execution ID
        execution_id: Option<String>,
        /// Only list executions of this workflow
        #[arg(long)]
        workflow_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum SpecialistAction {
    /// List built-in and loaded specialists
    List,
}

#[tokio::main]
async fn main() {
    // .env.local takes priority over .env; neither overrides the real environment
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quorum_core=warn,quorum_server=warn,quorum_cli=info".into()),
        )
        .init();

    let mut config = quorum_server::ServerConfig::from_env();
    config.db_path = cli.db;
    config.specialist_dir = cli.specialist_dir;
    config.capabilities_file = cli.capabilities_file;

    let result = if let Some(command) = cli.command {
        match command {
            Commands::Server { host, port } => {
                config.host = host;
                config.port = port;
                commands::server::run(config).await
            }

            Commands::Workflow { action } => {
                let state = commands::init_state(&config).await;
                match action {
                    WorkflowAction::List => commands::workflow::list(&state).await,
                    WorkflowAction::Run {
                        workflow_id,
                        input,
                        input_file,
                    } => {
                        commands::workflow::run(
                            &state,
                            &workflow_id,
                            input.as_deref(),
                            input_file.as_deref(),
                        )
                        .await
                    }
                    WorkflowAction::Resume {
                        execution_id,
                        payload,
                    } => commands::workflow::resume(&state, &execution_id, &payload).await,
                    WorkflowAction::Status {
                        execution_id,
                        workflow_id,
                    } => {
                        commands::workflow::status(
                            &state,
                            execution_id.as_deref(),
                            workflow_id.as_deref(),
                        )
                        .await
                    }
                }
            }

            Commands::Specialist { action } => {
                let state = commands::init_state(&config).await;
                match action {
                    SpecialistAction::List => commands::specialist::list(&state),
                }
            }
        }
    } else {
        // No subcommand — show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
