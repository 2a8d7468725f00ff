//! RADIUS Transaction Engine
//!
//! This crate layers UDP transaction handling on top of the
//! `radkit-proto` protocol core:
//!
//! - An async server with auth/acct sockets, a client registry, and an
//!   ordered handler chain that mutates default responses.
//! - An async client with retries, strict round-robin server selection,
//!   per-server identifier counters, and response-authenticator checks.
//! - JSON configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use radkit_engine::{ClientRegistry, PapHandler, Server, ServerConfig};
//! use radkit_proto::Dictionary;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dictionary = Arc::new(Dictionary::standard());
//!
//!     let mut handler = PapHandler::new(&dictionary)?;
//!     handler.add_user("alice", "password");
//!
//!     let mut clients = ClientRegistry::default();
//!     clients.insert("127.0.0.1/32".parse()?, "sharedsecret");
//!
//!     let server = Server::new(ServerConfig {
//!         bind_address: "0.0.0.0".parse()?,
//!         auth_port: 1812,
//!         acct_port: 1813,
//!         dictionary,
//!         clients,
//!         handlers: vec![Arc::new(handler)],
//!     })
//!     .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod server;

pub use client::{Client, ClientError};
pub use config::{ClientEntry, ClientRegistry, Config, ConfigError, UpstreamConfig, User};
pub use server::{
    Handler, HandlerError, Outcome, PapHandler, Server, ServerConfig, ServerError, SocketRole,
};
