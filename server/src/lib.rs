/// Campus Chat Server
///
/// Reference REST backend for the campus messaging client: conversation
/// snapshots, thread snapshots, sending, user search, and reports.
pub mod config;
pub mod db;
pub mod handlers;
pub mod server;
