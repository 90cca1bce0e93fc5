//! Script Web Server binary
//!
//! Starts the listener and turns the main thread into the home execution context.
//!
//! # Usage
//!
//! ```bash
//! script-web-server                      # port 8080, scripts are only logged
//! script-web-server --port 9000
//! script-web-server -- python3 -         # pipe each submission into python3
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use script_web_server::config::{self, ServerConfig};
use script_web_server::dispatcher::HomeContext;
use script_web_server::executor::{CommandExecutor, Executor, LogExecutor};
use script_web_server::logging;
use script_web_server::server::ScriptServer;

#[derive(Debug, Parser)]
#[command(
    name = "script-web-server",
    version,
    about = "Execute scripts submitted from a browser on a single home thread"
)]
struct Cli {
    /// Port to listen on (default: 8080, or the config file / SCRIPT_WEB_SERVER_PORT)
    #[arg(short, long)]
    port: Option<String>,

    /// Config file (default: ~/.script-web-server/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interpreter command each script is piped into, e.g. `-- python3 -`
    #[arg(last = true)]
    interpreter: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init();

    let mut server_config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    server_config.apply_env();
    server_config.override_port(cli.port.as_deref());
    if !cli.interpreter.is_empty() {
        server_config.interpreter = Some(cli.interpreter.clone());
    }

    let command = server_config
        .interpreter
        .as_deref()
        .and_then(CommandExecutor::from_command_line);
    match command {
        Some(executor) => {
            info!(program = executor.program(), "Scripts will be piped into interpreter");
            serve(server_config, executor)
        }
        None => {
            info!("No interpreter configured, scripts will only be logged");
            serve(server_config, LogExecutor::new())
        }
    }
}

/// Run the server with the calling (main) thread as the home context
fn serve<E: Executor + 'static>(server_config: ServerConfig, executor: E) -> ExitCode {
    let port = server_config.effective_port().to_string();
    let (mut home, dispatcher) = HomeContext::new(executor);
    let mut server = ScriptServer::new(server_config, dispatcher);

    if let Err(e) = server.start(&port) {
        error!(error = %e, "Server failed to start");
        return ExitCode::FAILURE;
    }
    if let Some(url) = server.url() {
        logging::write_line(&format!("Open {} in a browser to submit scripts", url));
    }

    let mut state = server.into_state();
    let executed = home.run();
    state.wait();

    info!(executed, "Server stopped");
    ExitCode::SUCCESS
}
