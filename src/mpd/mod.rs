//! MPD module: protocol client, player status parsing and the reconnecting listener.

pub mod connection;
pub mod events;
pub mod song;
pub mod status;

pub use connection::MpdDialer;
