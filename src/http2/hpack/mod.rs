//! # HPACK ヘッダー圧縮 (RFC 7541)
//!
//! - `table`: 静的テーブル (Appendix A) と FIFO 動的テーブル
//! - `huffman`: Huffman 符号化/復号化 (Appendix B)
//! - `decoder` / `encoder`: ヘッダーブロックの変換
//!
//! デコーダはコネクションごとに 1 インスタンスで、逐次的な
//! 圧縮コンテキストを保持します。

pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod table;

pub use decoder::HpackDecoder;
pub use encoder::HpackEncoder;

use std::fmt;

/// HPACK エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HpackError {
    /// テーブル範囲外のインデックス
    InvalidIndex(usize),
    /// 整数表現のオーバーフロー
    IntegerOverflow,
    /// Huffman 復号失敗
    Huffman,
    /// ブロックが途中で切れている
    UnexpectedEnd,
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIndex(i) => write!(f, "invalid HPACK index: {}", i),
            Self::IntegerOverflow => write!(f, "HPACK integer overflow"),
            Self::Huffman => write!(f, "Huffman decode error"),
            Self::UnexpectedEnd => write!(f, "HPACK block ended unexpectedly"),
        }
    }
}

impl std::error::Error for HpackError {}

/// HPACK 処理結果
pub type HpackResult<T> = Result<T, HpackError>;

/// N ビットプレフィックス整数のデコード (RFC 7541 Section 5.1)
///
/// 返り値は (値, 消費バイト数)。
pub fn decode_integer(buf: &[u8], prefix_bits: u8) -> HpackResult<(usize, usize)> {
    if buf.is_empty() {
        return Err(HpackError::UnexpectedEnd);
    }

    let mask = if prefix_bits >= 8 { 0xFF } else { (1u8 << prefix_bits) - 1 };
    let first = buf[0] & mask;
    if first < mask {
        return Ok((first as usize, 1));
    }

    let mut value = mask as usize;
    let mut shift: u32 = 0;
    let mut consumed = 1;
    loop {
        let byte = *buf.get(consumed).ok_or(HpackError::UnexpectedEnd)?;
        consumed += 1;
        let add = ((byte & 0x7F) as usize)
            .checked_shl(shift)
            .ok_or(HpackError::IntegerOverflow)?;
        value = value.checked_add(add).ok_or(HpackError::IntegerOverflow)?;
        if byte & 0x80 == 0 {
            return Ok((value, consumed));
        }
        shift += 7;
        if shift > 28 {
            return Err(HpackError::IntegerOverflow);
        }
    }
}

/// N ビットプレフィックス整数のエンコード (RFC 7541 Section 5.1)
///
/// `prefix` は最初のバイトの上位ビットパターン。
pub fn encode_integer(buf: &mut Vec<u8>, value: usize, prefix_bits: u8, prefix: u8) {
    let mask = if prefix_bits >= 8 { 0xFF } else { (1u8 << prefix_bits) - 1 };

    if value < mask as usize {
        buf.push(prefix | value as u8);
        return;
    }

    buf.push(prefix | mask);
    let mut rest = value - mask as usize;
    while rest >= 128 {
        buf.push(0x80 | (rest & 0x7F) as u8);
        rest >>= 7;
    }
    buf.push(rest as u8);
}
