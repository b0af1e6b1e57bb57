// wanlab-api: Async Rust client for the WAN lab shaping backend

pub mod client;
pub mod error;
pub mod lab;
pub mod models;
pub mod ports;
pub mod stream;
pub mod tools;
pub mod transport;

pub use client::LabClient;
pub use error::Error;
pub use stream::{SseDecoder, StatusStream};
pub use transport::{TlsMode, TransportConfig};
