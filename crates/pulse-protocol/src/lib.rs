pub mod events;
pub mod frames;
pub mod handshake;

/// Bumped whenever the outbound frame layout changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
