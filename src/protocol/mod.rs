//! # プロトコル選択
//!
//! ALPN によるアプリケーションプロトコルのネゴシエーション。

pub mod negotiation;

pub use negotiation::{classify_initial, NegotiatedProtocol, ALPN_H2_WITH_FALLBACK, ALPN_H3};
