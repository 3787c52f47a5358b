mod database;
mod dispatch;
mod error;
mod in_memory_db;
mod managers;
mod server;
mod socket;
#[cfg(test)]
mod test_utils;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(error) = server::start_server().await {
        tracing::error!(%error, "server exited");
        std::process::exit(1);
    }
}
