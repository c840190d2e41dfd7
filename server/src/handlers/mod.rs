/// HTTP handlers module
/// Provides the REST endpoints consumed by the messaging client

pub mod rest;

pub use rest::{
    create_report, get_messages, health, register_user, search, send_message, USER_ID_HEADER,
};
