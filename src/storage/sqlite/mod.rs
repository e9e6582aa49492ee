//! Shared `SQLite` infrastructure for the state store and archives.

mod connection;

pub use connection::{
    acquire_lock, configure_connection, open_connection, open_existing_connection,
};
