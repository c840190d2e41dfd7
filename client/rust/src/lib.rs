/// Campus Chat Client Library
/// Keeps a conversation list and an open 1:1 thread in sync with a REST backend by polling,
/// with optimistic sends, local block/report flags, and debounced user search.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod safety;
pub mod search;
pub mod selection;
pub mod store;
pub mod sync;
pub mod task;

pub use api::{ChatBackend, ServerApi};
pub use client::MessagingClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use store::{ChatState, ChatStore, SyncEvent};
pub use sync::SendOutcome;
