pub mod client;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod hub;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use endpoint::{router, ResolvedTenant, StreamState, STREAM_PATH};
pub use error::StreamError;
pub use gate::OriginGate;
pub use hub::Hub;
pub use types::{BroadcastReport, ClientSettings, ClientState, CloseReason};
