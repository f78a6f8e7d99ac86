// ihcbridge-api: Async Rust client for the IHC controller SOAP services.

pub mod client;
pub mod error;
mod soap;
pub mod transport;
pub mod values;

pub use client::IhcClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use values::{ResourceValue, RuntimeValue};
