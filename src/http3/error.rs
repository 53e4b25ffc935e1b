//! # HTTP/3 エラー定義
//!
//! フレーム読み取りは HTTP/2 側と同じ区別を持ちます:
//! ストリームの FIN がフレーム境界なら正常、フレーム途中なら
//! `Truncated`。制御ストリームの先頭が SETTINGS でない場合は
//! `MissingSettings`（ストリーム局所のエラー）。

use std::fmt;
use std::io;

use crate::http3::qpack::QpackError;

/// HTTP/3 エラー
#[derive(Debug)]
pub enum Http3Error {
    /// I/O エラー
    Io(io::Error),
    /// QUIC トランスポートエラー
    Quic(quiche::Error),
    /// ストリームがフレーム途中で終了した
    Truncated,
    /// 制御ストリームの最初のフレームが SETTINGS でない
    MissingSettings,
    /// ヘッダーブロックのデコード失敗（ストリーム局所）
    HeaderDecode(QpackError),
    /// 構造的に不正なフレーム
    InvalidFrame(String),
}

impl fmt::Display for Http3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Quic(e) => write!(f, "QUIC error: {:?}", e),
            Self::Truncated => write!(f, "Stream ended mid-frame"),
            Self::MissingSettings => {
                write!(f, "Control stream did not start with SETTINGS")
            }
            Self::HeaderDecode(e) => write!(f, "Header decode error: {}", e),
            Self::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
        }
    }
}

impl std::error::Error for Http3Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::HeaderDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Http3Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<quiche::Error> for Http3Error {
    fn from(e: quiche::Error) -> Self {
        Self::Quic(e)
    }
}

impl From<QpackError> for Http3Error {
    fn from(e: QpackError) -> Self {
        Self::HeaderDecode(e)
    }
}

/// HTTP/3 処理結果
pub type Http3Result<T> = Result<T, Http3Error>;
