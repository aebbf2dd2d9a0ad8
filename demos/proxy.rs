//! Proxy-mode demo server: any `user@host` with a Basic password of the
//! form `password=<secret>` gets a fresh in-memory account.

use std::sync::Arc;

use clap::Parser;

use filen_webdav::sdk::SessionFactory;
use filen_webdav::{ServerConfig, Tenancy, WebDavServer};

#[path = "mem_backend.rs"]
mod mem_backend;

#[derive(Parser, Debug)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Port to listen on
    #[arg(long, short, default_value_t = 1900)]
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let factory = Arc::new(mem_backend::AnyLogin) as Arc<dyn SessionFactory>;
    let config = ServerConfig::new().hostname(cli.hostname).port(cli.port);

    let server = match WebDavServer::new(config, Tenancy::Proxy { factory }) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = server.start().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
    println!(
        "webdav proxy demo listening on {}",
        server.local_addr().await.unwrap()
    );

    let _ = tokio::signal::ctrl_c().await;
    server.stop(true).await;
}
