/// Synchronization layer for the campus chat client.
/// Keeps the local conversation list and open thread convergent with the backend by polling,
/// and reconciles optimistic sends with the server's canonical copies.

pub mod conversations;
pub mod send;
pub mod thread;

pub use conversations::ConversationSynchronizer;
pub use send::{OptimisticSendPipeline, SendOutcome};
pub use thread::MessageThreadSynchronizer;
