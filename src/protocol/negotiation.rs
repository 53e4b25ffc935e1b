//! # ALPN ネゴシエーション (RFC 7301)
//!
//! http2 モードのリスナーは ALPN で `h2` を提示しつつ `http/1.1` への
//! フォールバックを許容します。h2 で合意したクライアントは必ず
//! コネクションプリフェースから送信を始めるため (RFC 7540 §3.5)、
//! 復号後の先頭バイトだけでプロトコルを確定できます。

use std::fmt;

/// h2 優先、http/1.1 フォールバック付きの ALPN リスト
pub const ALPN_H2_WITH_FALLBACK: &[&[u8]] = &[b"h2", b"http/1.1"];

/// HTTP/3 用 ALPN (quiche の QUIC 設定に渡す)
pub const ALPN_H3: &[&[u8]] = &[b"h3"];

/// HTTP/2 クライアントプリフェース (RFC 7540 §3.5)
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// ネゴシエーション結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    /// HTTP/1.1 (フォールバック)
    Http1_1,
    /// HTTP/2
    Http2,
    /// まだ判定できない（受信バイトが足りない）
    Undecided,
}

impl fmt::Display for NegotiatedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http1_1 => write!(f, "http/1.1"),
            Self::Http2 => write!(f, "h2"),
            Self::Undecided => write!(f, "undecided"),
        }
    }
}

/// 復号済みの先頭バイトからプロトコルを判定
///
/// プリフェース全体と一致すれば HTTP/2、プリフェースの接頭辞で
/// ありながら長さが足りない場合は `Undecided`、それ以外は HTTP/1.1。
pub fn classify_initial(buf: &[u8]) -> NegotiatedProtocol {
    if buf.len() >= HTTP2_PREFACE.len() {
        if &buf[..HTTP2_PREFACE.len()] == HTTP2_PREFACE {
            NegotiatedProtocol::Http2
        } else {
            NegotiatedProtocol::Http1_1
        }
    } else if HTTP2_PREFACE.starts_with(buf) {
        NegotiatedProtocol::Undecided
    } else {
        NegotiatedProtocol::Http1_1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_preface() {
        assert_eq!(classify_initial(HTTP2_PREFACE), NegotiatedProtocol::Http2);
        let mut with_frame = HTTP2_PREFACE.to_vec();
        with_frame.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 0, 0]);
        assert_eq!(classify_initial(&with_frame), NegotiatedProtocol::Http2);
    }

    #[test]
    fn test_classify_http1_request() {
        assert_eq!(
            classify_initial(b"GET / HTTP/1.1\r\n"),
            NegotiatedProtocol::Http1_1
        );
    }

    #[test]
    fn test_classify_partial_preface() {
        assert_eq!(classify_initial(b"PRI * HT"), NegotiatedProtocol::Undecided);
        assert_eq!(classify_initial(b""), NegotiatedProtocol::Undecided);
    }

    #[test]
    fn test_alpn_list_order() {
        // h2 を優先して提示する
        assert_eq!(ALPN_H2_WITH_FALLBACK[0], b"h2");
        assert_eq!(ALPN_H3[0], b"h3");
    }
}
