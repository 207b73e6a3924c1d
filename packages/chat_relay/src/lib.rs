//! Chat Relay - line-oriented TCP chat server
//!
//! Clients connect, claim a unique login with a `login:<name>` line, and
//! from then on every line they send is broadcast to all other logged-in
//! clients. New logins receive a replay of the most recent messages.
//!
//! # Example
//!
//! ```no_run
//! use chat_relay::{RelayConfig, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> chat_relay::Result<()> {
//!     let server = Server::bind(&RelayConfig::default()).await?;
//!     let cancel = CancellationToken::new();
//!
//!     let stop = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.cancel();
//!     });
//!
//!     server.run(cancel).await
//! }
//! ```

pub mod cli;
pub mod config;
mod error;
pub mod history;
pub mod metrics;
pub mod protocol;
pub mod roster;
pub mod server;
pub mod session;
pub mod state;

pub use config::{CliOverrides, RelayConfig};
pub use error::{RelayError, Result};
pub use history::HistoryBuffer;
pub use roster::{Roster, SessionId};
pub use server::Server;
pub use state::{ChatState, SharedState};
