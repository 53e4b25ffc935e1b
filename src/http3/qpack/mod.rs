//! # QPACK ヘッダー圧縮 (RFC 9204)
//!
//! HPACK をベースに QUIC のストリーム独立性へ対応した圧縮形式。
//! このサーバーは動的テーブルを広告せず（容量 0）、静的テーブルと
//! リテラルのみでエンコード・デコードします。動的テーブル参照と
//! ポストベース参照はエラーになります。

pub mod decoder;
pub mod encoder;
pub mod table;

pub use decoder::QpackDecoder;
pub use encoder::QpackEncoder;

use std::fmt;

use crate::http2::hpack::{self, HpackError};

/// QPACK エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QpackError {
    /// 無効なインデックス（動的テーブル参照を含む）
    InvalidIndex(usize),
    /// プレフィックス整数のオーバーフロー
    IntegerOverflow,
    /// Huffman デコード失敗
    Huffman,
    /// ブロックが途中で終わっている
    UnexpectedEnd,
    /// 未対応の表現（ポストベース参照）
    PostBaseReference,
}

impl fmt::Display for QpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIndex(i) => write!(f, "Invalid index: {}", i),
            Self::IntegerOverflow => write!(f, "Integer overflow"),
            Self::Huffman => write!(f, "Huffman decode error"),
            Self::UnexpectedEnd => write!(f, "Unexpected end of field section"),
            Self::PostBaseReference => write!(f, "Post-base reference without dynamic table"),
        }
    }
}

impl std::error::Error for QpackError {}

/// QPACK 処理結果
pub type QpackResult<T> = Result<T, QpackError>;

/// プレフィックス整数デコード (RFC 9204 Section 4.1.1)
///
/// 符号化は HPACK と同一 (RFC 7541 Section 5.1)。
pub fn decode_integer(buf: &[u8], prefix_bits: u8) -> QpackResult<(usize, usize)> {
    hpack::decode_integer(buf, prefix_bits).map_err(|e| match e {
        HpackError::IntegerOverflow => QpackError::IntegerOverflow,
        _ => QpackError::UnexpectedEnd,
    })
}

/// プレフィックス整数エンコード (RFC 9204 Section 4.1.1)
pub fn encode_integer(buf: &mut Vec<u8>, value: usize, prefix_bits: u8, prefix: u8) {
    hpack::encode_integer(buf, value, prefix_bits, prefix);
}
