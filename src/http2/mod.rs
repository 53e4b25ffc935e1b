//! # HTTP/2 実装 (RFC 7540 / RFC 7541)

pub mod assembler;
pub mod connection;
pub mod error;
pub mod frame;
pub mod hpack;
pub mod settings;

pub use connection::{Http2Connection, CONNECTION_PREFACE};
pub use error::{Http2Error, Http2Result};
