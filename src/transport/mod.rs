//! Transport module - connection establishment.
//!
//! The store speaks over plain TCP; no TLS or authentication is layered on.

mod tcp;

pub use tcp::connect;
