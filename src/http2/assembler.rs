//! # ストリームリクエストアセンブラ
//!
//! ストリームごとの状態機械:
//!
//! ```text
//!         HEADERS(+END_HEADERS)          END_STREAM
//!  Idle ------------------------> HeadersReceived ----> Complete
//!    \___ HEADERS(-END_HEADERS) ... CONTINUATION 待ち ___/
//! ```
//!
//! END_STREAM は DATA だけでなくトレーラ HEADERS でも届きます。
//!
//! END_HEADERS の無い HEADERS は CONTINUATION が届くまでデコード
//! されず、届かなければリクエストは未完成のまま残ります。
//! 完了は冪等で、組み立て済みリクエストは一度だけ取り出せます。

use crate::request::Request;

/// ストリームの組み立てフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// ヘッダー未受信（フラグメント蓄積中を含む）
    #[default]
    Idle,
    /// ヘッダーブロックをデコード済み
    HeadersReceived,
    /// END_STREAM を観測済み、応答可能
    Complete,
}

/// ストリームごとのリクエストアセンブラ
#[derive(Default)]
pub struct RequestAssembler {
    phase: StreamPhase,
    /// END_HEADERS 前のヘッダーブロックフラグメント
    fragments: Vec<u8>,
    /// CONTINUATION 待ちかどうか
    awaiting_continuation: bool,
    /// END_STREAM を観測したか（ヘッダーデコード前に来ることもある）
    end_stream_seen: bool,
    /// 組み立て済みリクエスト（take で一度だけ取り出し）
    request: Option<Request>,
    handed_out: bool,
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    #[inline]
    pub fn awaiting_continuation(&self) -> bool {
        self.awaiting_continuation
    }

    /// HEADERS フレームを処理
    ///
    /// END_HEADERS ならヘッダーブロック全体を返します。呼び出し側が
    /// デコードして `headers_decoded` を呼びます。
    pub fn on_headers(
        &mut self,
        fragment: &[u8],
        end_headers: bool,
        end_stream: bool,
    ) -> Option<Vec<u8>> {
        if self.phase == StreamPhase::Complete {
            return None;
        }
        self.fragments.extend_from_slice(fragment);
        if end_stream {
            self.end_stream_seen = true;
        }
        if end_headers {
            self.awaiting_continuation = false;
            self.complete_if_terminated();
            Some(std::mem::take(&mut self.fragments))
        } else {
            self.awaiting_continuation = true;
            None
        }
    }

    /// CONTINUATION フレームを処理
    pub fn on_continuation(&mut self, fragment: &[u8], end_headers: bool) -> Option<Vec<u8>> {
        if self.phase == StreamPhase::Complete || !self.awaiting_continuation {
            return None;
        }
        self.fragments.extend_from_slice(fragment);
        if end_headers {
            self.awaiting_continuation = false;
            self.complete_if_terminated();
            Some(std::mem::take(&mut self.fragments))
        } else {
            None
        }
    }

    /// トレーラ HEADERS でストリームが終端したら完了に進める
    ///
    /// END_STREAM はヘッダーブロックが閉じるまで効力を持たないため、
    /// END_HEADERS を見たタイミングでだけ呼ばれます。
    fn complete_if_terminated(&mut self) {
        if self.end_stream_seen && self.phase == StreamPhase::HeadersReceived {
            self.phase = StreamPhase::Complete;
        }
    }

    /// デコード済みリクエストを受け取り、フェーズを進める
    pub fn headers_decoded(&mut self, request: Request) {
        if self.phase != StreamPhase::Idle {
            return;
        }
        self.request = Some(request);
        self.phase = if self.end_stream_seen {
            StreamPhase::Complete
        } else {
            StreamPhase::HeadersReceived
        };
    }

    /// DATA フレームを処理（ボディは保持しない）
    pub fn on_data(&mut self, end_stream: bool) {
        if end_stream {
            self.end_stream_seen = true;
            if self.phase == StreamPhase::HeadersReceived {
                self.phase = StreamPhase::Complete;
            }
        }
    }

    /// 応答可能なら組み立て済みリクエストを一度だけ返す
    pub fn take_request(&mut self) -> Option<Request> {
        if self.phase != StreamPhase::Complete || self.handed_out {
            return None;
        }
        self.handed_out = true;
        self.request.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Protocol, Request};

    fn request() -> Request {
        Request {
            protocol: Protocol::Http2,
            method: "GET".to_string(),
            path: "index.html".to_string(),
            headers: Vec::new(),
        }
    }

    #[test]
    fn test_headers_with_end_stream_completes() {
        let mut asm = RequestAssembler::new();
        let block = asm.on_headers(b"\x82", true, true).unwrap();
        assert_eq!(block, b"\x82");
        asm.headers_decoded(request());
        assert_eq!(asm.phase(), StreamPhase::Complete);
        assert!(asm.take_request().is_some());
    }

    #[test]
    fn test_data_end_stream_completes() {
        let mut asm = RequestAssembler::new();
        asm.on_headers(b"\x82", true, false).unwrap();
        asm.headers_decoded(request());
        assert_eq!(asm.phase(), StreamPhase::HeadersReceived);
        assert!(asm.take_request().is_none());
        asm.on_data(false);
        assert_eq!(asm.phase(), StreamPhase::HeadersReceived);
        asm.on_data(true);
        assert_eq!(asm.phase(), StreamPhase::Complete);
        assert!(asm.take_request().is_some());
    }

    #[test]
    fn test_missing_continuation_stays_incomplete() {
        let mut asm = RequestAssembler::new();
        // END_HEADERS 無し → ブロックはまだ返らない
        assert!(asm.on_headers(b"\x82\x86", false, true).is_none());
        assert!(asm.awaiting_continuation());
        assert_eq!(asm.phase(), StreamPhase::Idle);
        assert!(asm.take_request().is_none());
    }

    #[test]
    fn test_continuation_completes_block() {
        let mut asm = RequestAssembler::new();
        assert!(asm.on_headers(b"\x82", false, true).is_none());
        assert!(asm.on_continuation(b"\x86", false).is_none());
        let block = asm.on_continuation(b"\x84", true).unwrap();
        assert_eq!(block, b"\x82\x86\x84");
        asm.headers_decoded(request());
        assert_eq!(asm.phase(), StreamPhase::Complete);
    }

    #[test]
    fn test_trailer_headers_with_end_stream_completes() {
        let mut asm = RequestAssembler::new();
        asm.on_headers(b"\x82", true, false).unwrap();
        asm.headers_decoded(request());
        assert_eq!(asm.phase(), StreamPhase::HeadersReceived);
        // トレーラ: HEADERS(END_HEADERS | END_STREAM)
        let trailer = asm.on_headers(b"\x86", true, true).unwrap();
        assert_eq!(trailer, b"\x86");
        assert_eq!(asm.phase(), StreamPhase::Complete);
        assert!(asm.take_request().is_some());
    }

    #[test]
    fn test_trailer_split_across_continuation() {
        let mut asm = RequestAssembler::new();
        asm.on_headers(b"\x82", true, false).unwrap();
        asm.headers_decoded(request());
        // END_STREAM 付きトレーラだが END_HEADERS はまだ
        assert!(asm.on_headers(b"\x86", false, true).is_none());
        assert_eq!(asm.phase(), StreamPhase::HeadersReceived);
        assert!(asm.on_continuation(b"\x84", true).is_some());
        assert_eq!(asm.phase(), StreamPhase::Complete);
        assert!(asm.take_request().is_some());
    }

    #[test]
    fn test_completion_is_idempotent() {
        let mut asm = RequestAssembler::new();
        asm.on_headers(b"\x82", true, true).unwrap();
        asm.headers_decoded(request());
        assert!(asm.take_request().is_some());
        // 追加の終端イベントや再取り出しは無効
        asm.on_data(true);
        assert!(asm.take_request().is_none());
        assert!(asm.on_headers(b"\x82", true, true).is_none());
    }

    #[test]
    fn test_unexpected_continuation_ignored() {
        let mut asm = RequestAssembler::new();
        assert!(asm.on_continuation(b"\x82", true).is_none());
        assert_eq!(asm.phase(), StreamPhase::Idle);
    }
}
