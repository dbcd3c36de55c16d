use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

mod context;
mod server;

/// Command-line arguments. Every flag can also come from the environment
/// (or a `.env` file next to the binary).
#[derive(Parser, Debug, Clone)]
#[command(name = "ecobin-server")]
#[command(author, version, about = "EcoBin - reward token issuance and redemption service")]
pub struct Args {
    /// Address to which the HTTP server will bind
    #[arg(long, env = "ECOBIN_BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind_addr: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://ecobin@localhost:5432/ecobin")]
    pub database_url: String,

    /// Shared secret bins send in the X-API-KEY header
    #[arg(long, env = "ECOBIN_API_TOKEN")]
    pub api_token: String,

    /// Base URL used to build redemption and QR links
    #[arg(long, env = "ECOBIN_PUBLIC_BASE_URL", default_value = "http://localhost:5000")]
    pub public_base_url: String,

    /// Optional JSON tariff, e.g. {"bottle": 100, "paper": 50}
    #[arg(long, env = "ECOBIN_TARIFF_FILE")]
    pub tariff_file: Option<String>,

    /// Rendered QR images kept in memory (least recently used are dropped)
    #[arg(long, env = "ECOBIN_QR_CACHE_SIZE", default_value_t = 1024)]
    pub qr_cache_size: usize,

    /// Keep tokens and balances in memory only (development)
    #[arg(long, default_value = "false")]
    pub memory: bool,

    /// Account ids to register in the in-memory ledger (comma separated)
    #[arg(long = "open-account", env = "ECOBIN_OPEN_ACCOUNTS", value_delimiter = ',')]
    pub open_accounts: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ecobin_server=info,ecobin_core=info,tower_http=info"));
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("EcoBin server starting. bind_addr={}, memory={}", args.bind_addr, args.memory);

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
