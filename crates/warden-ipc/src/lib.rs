//! Async CBOR-over-UNIX-socket transport used to carry dispatcher requests
//! between the `warden` CLI client and the `wardend` daemon.

pub mod client;
pub mod server;
pub mod wire;

pub use client::WardenClient;
pub use server::{serve_unix, RequestHandler};
pub use wire::IpcError;
