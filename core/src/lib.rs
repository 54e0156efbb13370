//! Core of the minircd IRC daemon: registries, link graph, buffered
//! socket I/O, and the protocol engine.

pub mod buffer;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod hash;
pub mod message;
pub mod motd;
pub mod numeric;
pub mod server;
pub mod state;
pub mod user;

pub use buffer::{BufferPool, RecvQueue, SendQueue};
pub use channel::Channel;
pub use config::Config;
pub use engine::{on_readable, on_writable, Transport};
pub use error::{Error, Result};
pub use graph::{LinkGraph, LinkId};
pub use handlers::{command_table, CommandTable};
pub use hash::HashTable;
pub use message::Message;
pub use motd::Motd;
pub use numeric::NumericReply;
pub use server::Server;
pub use state::ServerState;
pub use user::{RegistrationState, User};
