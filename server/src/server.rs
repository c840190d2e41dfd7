/// HTTP server factory and configuration.
/// Provides reusable functions to create and configure the HTTP server
/// for use in both the main binary and tests.

use crate::db::DbPool;
use crate::handlers::{create_report, get_messages, health, register_user, search, send_message};
use actix_web::{middleware, web, App, HttpServer};

/// Register every REST route on an actix service config
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/users", web::post().to(register_user))
        .route("/messages", web::get().to(get_messages))
        .route("/messages", web::post().to(send_message))
        .route("/search", web::get().to(search))
        .route("/reports", web::post().to(create_report));
}

/// Create a configured HTTP server
///
/// Takes a database pool and bind address, then returns a fully configured
/// `HttpServer` ready to be run.
///
/// # Example
/// ```ignore
/// let pool = web::Data::new(db::create_pool("campus.db")?);
/// let server = server::create_http_server(pool, "127.0.0.1:4000")?;
/// server.await?;
/// ```
pub fn create_http_server(
    pool: web::Data<DbPool>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server over the given pool, bound to a random port
///
/// # Returns
/// A tuple of (server, bind_address) where bind_address can be used to make requests
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_http_server_with_pool(
    pool: DbPool,
) -> std::io::Result<(actix_web::dev::Server, String)> {
    let pool = web::Data::new(pool);

    // Bind to 127.0.0.1:0 to get a random available port
    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .workers(1)
    .bind("127.0.0.1:0")?;

    let addr_str = server
        .addrs()
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    Ok((server.run(), addr_str))
}

/// Create a test HTTP server with an in-memory database
///
/// # Example
/// ```ignore
/// let (server, addr) = server::create_test_http_server()?;
/// tokio::spawn(server);
/// let resp = reqwest::get(&format!("http://{}/health", addr)).await?;
/// ```
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_http_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    create_test_http_server_with_pool(crate::db::create_test_pool())
}
