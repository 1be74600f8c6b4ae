//! `pweb`: serve a folder, relaying configured prefixes to backends.
//!
//! ```text
//! pweb serve ./site --port 8080
//!     → load server.json (+ optional mimetypes.json)
//!     → bind every --listen-at address
//!     → Ctrl+C → stop → wait
//!
//! pweb init ./site
//!     → write a commented server.json template
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pweb_relay::config::loader::{load_server_config, write_template};
use pweb_relay::config::{ListenConfig, TlsConfig};
use pweb_relay::lifecycle::signals::stop_on_ctrl_c;
use pweb_relay::observability::init_logging;
use pweb_relay::start;

#[derive(Parser)]
#[command(name = "pweb")]
#[command(about = "Static file server with backend relay prefixes", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a folder
    Serve {
        /// Folder to serve
        #[arg(default_value = ".")]
        folder: PathBuf,

        /// Port to listen on (default 8080, or 80/443 with --privileged)
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve HTTPS
        #[arg(long, requires_all = ["cert", "key"])]
        secure: bool,

        /// PEM certificate chain for --secure
        #[arg(long)]
        cert: Option<PathBuf>,

        /// PEM private key for --secure
        #[arg(long)]
        key: Option<PathBuf>,

        /// Address to bind; repeat for several (default localhost, or all interfaces with --privileged)
        #[arg(long = "listen-at")]
        listen_at: Vec<String>,

        /// Allow privileged ports and binding all interfaces by default
        #[arg(long)]
        privileged: bool,

        /// JSON object mapping file extensions to content types
        #[arg(long)]
        mime_types: Option<PathBuf>,
    },
    /// Write a commented server.json template into a folder
    Init {
        #[arg(default_value = ".")]
        folder: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Serve {
            folder,
            port,
            secure,
            cert,
            key,
            listen_at,
            privileged,
            mime_types,
        } => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "pweb starting");

            let config = load_server_config(&folder, mime_types.as_deref())?;
            tracing::info!(folder = %config.served_dir.display(), "Serving folder");

            let tls = match (cert, key) {
                (Some(cert_path), Some(key_path)) => Some(TlsConfig { cert_path, key_path }),
                _ => None,
            };
            let listen = ListenConfig {
                addresses: listen_at,
                port,
                secure,
                privileged,
                tls,
            };

            let server = start(config, &listen).await?;
            tracing::info!(prefixes = ?server.prefixes(), "Ready, press Ctrl-C to stop");
            tokio::spawn(stop_on_ctrl_c(server.shutdown().clone()));
            server.wait().await?;

            tracing::info!("Shutdown complete");
        }
        Commands::Init { folder } => {
            let path = write_template(&folder)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
