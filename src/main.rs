//! WebSocket echo server binary
//!
//! `ripple-ws [-p PORT] [-h HOST]` — values may follow the flag or be
//! attached to it (`-p8080`). Anything else prints the usage line and the
//! process exits without starting the server.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ripple_ws::server::echo_handler;
use ripple_ws::{Config, Server};

const USAGE: &str = "Usage: ripple-ws [-p PORT] [-h HOST]";

// The built-in help flag is disabled so `-h` can mean host, matching the
// traditional flag set of this server.
#[derive(Parser, Debug)]
#[command(name = "ripple-ws", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Port to listen on
    #[arg(short = 'p', value_name = "PORT", default_value_t = 80)]
    port: u16,

    /// Host address to bind
    #[arg(short = 'h', value_name = "HOST", default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            println!("{}", USAGE);
            return;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple_ws=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = match Server::bind(&cli.host, cli.port, Config::default()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(host = %cli.host, port = cli.port, error = %e, "failed to start");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run(echo_handler) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "listener failed");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
}
