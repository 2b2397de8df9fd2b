//! flatvec-db CLI
//!
//! # Usage
//!
//! ```bash
//! # Start the server
//! flatvec-db serve --data-dir ./data --port 8080
//!
//! # Inspect a database file without loading it
//! flatvec-db stats --file ./data/embeddings.db
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flatvec_db::catalog::{Catalog, DEFAULT_CAPACITY};
use flatvec_db::server;
use flatvec_db::store::HeaderInfo;
use flatvec_db::tombstones::TombstoneLog;

#[derive(Parser)]
#[command(name = "flatvec-db")]
#[command(about = "An embedded vector database with exact nearest-neighbor search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the TCP server
    Serve {
        /// Directory holding the .db / .del files
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Row capacity for newly created databases
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: u64,
    },

    /// Display header statistics of a .db file
    Stats {
        /// Path to the .db file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            data_dir,
            host,
            port,
            capacity,
        } => {
            std::fs::create_dir_all(&data_dir)?;
            let catalog = server::shared_catalog(Catalog::new(&data_dir, capacity));

            let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
            tracing::info!(
                "listening on {} (data dir {:?}, capacity {})",
                listener.local_addr()?,
                data_dir,
                capacity
            );
            server::run(listener, catalog).await?;
        }

        Commands::Stats { file } => {
            let header = HeaderInfo::read(&file)?;
            println!("Database File: {:?}", file);
            println!("  Vectors: {}", header.vector_count);
            println!("  Capacity: {}", header.max_capacity);
            println!("  Dimensions: {}", header.dimensions);
            println!("  Next auto id: {}", header.next_id);

            let mut del_path = file.into_os_string();
            del_path.push(".del");
            let tombstones = TombstoneLog::new(PathBuf::from(del_path)).record_count()?;
            println!("  Tombstone records: {}", tombstones);
        }
    }

    Ok(())
}
