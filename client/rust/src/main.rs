/// Campus Chat Client - Main entry point
///
/// A command-line client for polled 1:1 campus messaging
use anyhow::Context;
use campus_chat_client::{cli, ClientConfig, MessagingClient};
use clap::Parser;
use log::info;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "campus-chat")]
#[command(about = "Campus Chat Client - polled direct messaging")]
struct Args {
    /// Server URL (default: http://localhost:4000)
    #[arg(long, default_value = "http://localhost:4000")]
    server: String,

    /// Id of the user this client acts as
    #[arg(long)]
    user_id: String,

    /// Conversation list poll period in milliseconds
    #[arg(long, default_value_t = 5000)]
    list_interval_ms: u64,

    /// Open thread poll period in milliseconds
    #[arg(long, default_value_t = 3000)]
    thread_interval_ms: u64,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose flag
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    info!("Starting Campus Chat Client");
    info!("Server: {}", args.server);
    info!("User: {}", args.user_id);

    let config = ClientConfig::new(&args.server, args.user_id.as_str())
        .context("Invalid client configuration")?
        .with_list_poll_interval(Duration::from_millis(args.list_interval_ms))
        .with_thread_poll_interval(Duration::from_millis(args.thread_interval_ms));

    let client = MessagingClient::new(config).context("Failed to create client")?;
    client.start().await;

    let result = cli::run_client_loop(&client).await;
    client.shutdown().await;
    result.context("Client loop failed")?;

    Ok(())
}
