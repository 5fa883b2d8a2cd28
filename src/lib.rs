//! Pure Rust async client for the GoldSrc (HLDS) challenge rcon protocol over UDP.
pub mod client;
pub mod error;
pub mod options;
pub mod packet;
pub mod server;
pub mod transport;
