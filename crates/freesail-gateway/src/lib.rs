//! Session and surface synchronization gateway for Freesail.
//!
//! This crate provides:
//! - NDJSON streams that push surface updates to client renderers
//! - Upstream action routing into per-session mailboxes
//! - JSON-RPC 2.0 methods for agents, over HTTP and WebSocket
//! - Catalog registration and component validation

pub mod error;
pub mod events;
pub mod handlers;
pub mod http;
pub mod mailbox;
pub mod methods;
pub mod output;
pub mod rpc;
pub mod server;
pub mod session;
pub mod state;
pub mod stats;
pub mod surface;

pub use error::GatewayError;
pub use handlers::HandlerContext;
pub use methods::{MethodHandler, MethodRegistry};
pub use output::{ChannelOutput, OutputChannel};
pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::Gateway;
pub use state::GatewayState;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
