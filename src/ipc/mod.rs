//! IPC module for daemon-UI communication

mod client;
mod protocol;
mod server;

pub use client::Client;
pub use protocol::{Request, Response};
pub use server::Server;
