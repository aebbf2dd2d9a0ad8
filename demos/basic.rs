//! Single-tenant demo server over an in-memory backend.
//!
//! Mount it with e.g. `rclone lsd :webdav,url=http://127.0.0.1:1900,user=admin,pass=admin:`
//! or from Finder / Explorer with username `admin`, password `admin`.

use std::sync::Arc;

use clap::Parser;

use filen_webdav::sdk::CloudClient;
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

    /// Basic auth username
    #[arg(long, default_value = "admin")]
    username: String,

    /// Basic auth password
    #[arg(long, default_value = "admin")]
    password: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let client = mem_backend::MemBackend::new() as Arc<dyn CloudClient>;
    let config = ServerConfig::new()
        .hostname(cli.hostname)
        .port(cli.port)
        .user(cli.username, cli.password)
        .temp_files_to_store_on_disk(vec![
            ".DS_Store".to_string(),
            "._*".to_string(),
            "Thumbs.db".to_string(),
        ]);

    let server = match WebDavServer::new(config, Tenancy::SingleTenant { client }) {
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
        "webdav demo listening on {}",
        server.local_addr().await.unwrap()
    );

    let _ = tokio::signal::ctrl_c().await;
    server.stop(true).await;
}
