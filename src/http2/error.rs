//! # HTTP/2 エラー定義
//!
//! フレーム読み取りは EOF の位置で 2 種類に区別されます:
//! フレーム境界での EOF は `ConnectionClosed`（正常終了）、
//! フレーム途中での EOF は `Truncated`（異常）。

use std::fmt;
use std::io;

use crate::http2::hpack::HpackError;

/// HTTP/2 エラー
#[derive(Debug)]
pub enum Http2Error {
    /// I/O エラー
    Io(io::Error),
    /// フレーム境界での正常な接続終了
    ConnectionClosed,
    /// フレーム受信途中での接続終了
    Truncated,
    /// 不正なコネクションプリフェース
    InvalidPreface,
    /// フレームが大きすぎる (actual, max)
    FrameTooLarge(usize, usize),
    /// 構造的に不正なフレーム
    InvalidFrame(String),
    /// ヘッダーブロックのデコード失敗（ストリーム局所）
    HeaderDecode(HpackError),
}

impl fmt::Display for Http2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Truncated => write!(f, "Connection closed mid-frame"),
            Self::InvalidPreface => write!(f, "Invalid connection preface"),
            Self::FrameTooLarge(actual, max) => {
                write!(f, "Frame too large: {} bytes (max: {})", actual, max)
            }
            Self::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            Self::HeaderDecode(e) => write!(f, "Header decode error: {}", e),
        }
    }
}

impl std::error::Error for Http2Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::HeaderDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Http2Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<HpackError> for Http2Error {
    fn from(e: HpackError) -> Self {
        Self::HeaderDecode(e)
    }
}

/// HTTP/2 処理結果
pub type Http2Result<T> = Result<T, Http2Error>;

/// RST_STREAM / GOAWAY で使用するエラーコード (RFC 7540 Section 7)
pub mod error_code {
    /// 正常終了
    pub const NO_ERROR: u32 = 0x0;
    /// HPACK 圧縮コンテキストの破損
    pub const COMPRESSION_ERROR: u32 = 0x9;
}
