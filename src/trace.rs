//! # フレームトレース
//!
//! フレーム単位のコンソールトレース。グローバルなロックではなく、
//! 注入可能なシンクハンドルとして実装します。ハンドルは Clone 可能で、
//! 同一ランタイムスレッド内のタスク間で共有されます。

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::request::Protocol;

/// トレース方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 受信フレーム
    Recv,
    /// 送信フレーム
    Send,
}

/// フレームトレースシンク
///
/// 1 イベント = 1 行。行の書き込みは単一の `write!` で行われるため、
/// 同一シンクを共有するタスク間で行が混ざることはありません。
#[derive(Clone)]
pub struct TraceSink {
    out: Rc<RefCell<Box<dyn Write>>>,
    enabled: bool,
}

impl TraceSink {
    /// 標準エラー出力へのシンクを作成
    pub fn stderr() -> Self {
        Self {
            out: Rc::new(RefCell::new(Box::new(std::io::stderr()))),
            enabled: true,
        }
    }

    /// 何も出力しないシンクを作成
    pub fn disabled() -> Self {
        Self {
            out: Rc::new(RefCell::new(Box::new(std::io::sink()))),
            enabled: false,
        }
    }

    /// バッファに記録するシンクを作成（テスト用）
    pub fn capture() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let writer = CaptureWriter { buf: buf.clone() };
        let sink = Self {
            out: Rc::new(RefCell::new(Box::new(writer))),
            enabled: true,
        };
        (sink, buf)
    }

    /// フレームイベントを 1 行で記録
    pub fn frame(&self, dir: Direction, protocol: Protocol, stream_id: u64, detail: &str) {
        if !self.enabled {
            return;
        }
        let arrow = match dir {
            Direction::Recv => "<<",
            Direction::Send => ">>",
        };
        let mut out = self.out.borrow_mut();
        let _ = writeln!(out, "[{}] {} stream={} {}", protocol, arrow, stream_id, detail);
    }

    /// 接続レベルのイベントを記録
    pub fn event(&self, protocol: Protocol, detail: &str) {
        if !self.enabled {
            return;
        }
        let mut out = self.out.borrow_mut();
        let _ = writeln!(out, "[{}] -- {}", protocol, detail);
    }
}

struct CaptureWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_lines() {
        let (sink, buf) = TraceSink::capture();
        sink.frame(Direction::Recv, Protocol::Http2, 1, "HEADERS len=12");
        sink.frame(Direction::Send, Protocol::Http2, 1, "DATA len=0 end_stream");
        let text = String::from_utf8(buf.borrow().clone()).unwrap();
        assert!(text.contains("[HTTP/2] << stream=1 HEADERS len=12"));
        assert!(text.contains("[HTTP/2] >> stream=1 DATA len=0 end_stream"));
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = TraceSink::disabled();
        // 出力先が io::sink なので何も起きないことだけ確認
        sink.event(Protocol::Http3, "connection established");
    }
}
