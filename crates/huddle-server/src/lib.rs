pub mod client;
pub mod config;
pub mod error;
pub mod event_bridge;
pub mod handlers;
pub mod hub;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod wire;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hub::SessionHub;
pub use server::{start, ServerHandle};
