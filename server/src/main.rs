/// Campus Chat Server
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Database initialization
/// - HTTP server startup
use actix_web::web;
use campus_chat_server::{config::Config, db, server};
use std::fs;
use std::process;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting Campus Chat Server");
    log::info!("Database: {:?}", config.database);
    log::info!("Port: {}", config.port);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        fs::write(pidfile, process::id().to_string())?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    let db_path = config.database.to_string_lossy().into_owned();
    let pool = db::create_pool(&db_path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    log::info!("Database initialized");

    let bind_addr = format!("127.0.0.1:{}", config.port);
    log::info!("Starting HTTP server on {}", bind_addr);

    server::create_http_server(web::Data::new(pool), &bind_addr)?.await
}
