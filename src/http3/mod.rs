//! # HTTP/3 実装 (RFC 9114 / RFC 9204)

pub mod connection;
pub mod error;
pub mod frame;
pub mod qpack;
pub mod server;

pub use error::{Http3Error, Http3Result};
