//! # HTTP/3 コネクション処理 (RFC 9114)
//!
//! quiche の QUIC コネクションの上で HTTP/3 層を駆動します。
//! ストリームごとの状態機械（制御ストリーム / リクエストストリーム）は
//! バイト列を与える純粋なオブジェクトで、QUIC 無しで検証できます。
//! QPACK デコーダはコネクションフィールドとして保持され、各ストリームの
//! ヘッダーブロック処理へ明示的に渡されます。

use std::collections::HashMap;

use ftlog::warn;

use crate::content::ContentStore;
use crate::http3::error::{Http3Error, Http3Result};
use crate::http3::frame::{decode_varint, setting, stream_type, H3Frame};
use crate::http3::qpack::{QpackDecoder, QpackEncoder};
use crate::request::{content_type_for, Protocol, Request};
use crate::trace::{Direction, TraceSink};

/// サーバー発の制御ストリーム ID（最初のサーバー単方向ストリーム）
const SERVER_CONTROL_STREAM_ID: u64 = 3;

/// QPACK 圧縮展開失敗のエラーコード (RFC 9204 Section 6)
const QPACK_DECOMPRESSION_FAILED: u64 = 0x200;

/// クライアント発の双方向ストリームか
#[inline]
fn is_client_bidi(stream_id: u64) -> bool {
    stream_id & 0x3 == 0
}

/// クライアント発の単方向ストリームか
#[inline]
fn is_client_uni(stream_id: u64) -> bool {
    stream_id & 0x3 == 2
}

/// クライアント制御ストリームの状態機械
///
/// 最初のフレームは SETTINGS でなければなりません (RFC 9114
/// Section 6.2.1)。違反はこのストリームだけのエラーで、他の
/// ストリームの処理は続行されます。
#[derive(Default)]
pub struct ControlStream {
    buf: Vec<u8>,
    settings_received: bool,
    /// 受信した SETTINGS エントリ
    pub settings: Vec<(u64, u64)>,
    /// GOAWAY で通知された ID
    pub goaway: Option<u64>,
}

impl ControlStream {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn settings_received(&self) -> bool {
        self.settings_received
    }

    /// 受信バイトを与えてフレームを処理
    pub fn feed(&mut self, data: &[u8], fin: bool) -> Http3Result<()> {
        self.buf.extend_from_slice(data);

        while let Some((frame, consumed)) = H3Frame::decode(&self.buf)? {
            self.buf.drain(..consumed);
            match frame {
                H3Frame::Settings(settings) => {
                    if !self.settings_received {
                        self.settings_received = true;
                        self.settings = settings;
                    }
                }
                _ if !self.settings_received => {
                    return Err(Http3Error::MissingSettings);
                }
                H3Frame::GoAway(id) => self.goaway = Some(id),
                // MAX_PUSH_ID 等は追跡しない
                _ => {}
            }
        }

        if fin && !self.buf.is_empty() {
            return Err(Http3Error::Truncated);
        }
        Ok(())
    }
}

/// リクエストストリームの状態機械
///
/// HEADERS をデコードしてリクエストを組み立て、FIN で完了します。
/// 完了は冪等で、リクエストは一度だけ返されます。
#[derive(Default)]
pub struct RequestStream {
    buf: Vec<u8>,
    request: Option<Request>,
    fin_seen: bool,
    handed_out: bool,
}

impl RequestStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信バイトを与え、リクエストが完成したら一度だけ返す
    ///
    /// フレーム途中の FIN は `Truncated`。ヘッダーブロックの
    /// デコード失敗は `HeaderDecode` でストリーム局所です。
    pub fn feed(
        &mut self,
        data: &[u8],
        fin: bool,
        qpack: &mut QpackDecoder,
    ) -> Http3Result<Option<Request>> {
        self.buf.extend_from_slice(data);

        while let Some((frame, consumed)) = H3Frame::decode(&self.buf)? {
            self.buf.drain(..consumed);
            match frame {
                H3Frame::Headers(block) => {
                    // 最初の HEADERS のみ。トレーラーは読み飛ばす。
                    if self.request.is_none() {
                        let fields = qpack.decode_field_section(&block)?;
                        self.request = Some(Request::from_fields(Protocol::Http3, &fields));
                    }
                }
                // ボディは保持しない
                H3Frame::Data(_) => {}
                _ => {}
            }
        }

        if fin {
            if !self.buf.is_empty() {
                return Err(Http3Error::Truncated);
            }
            self.fin_seen = true;
        }

        if self.fin_seen && !self.handed_out {
            if let Some(request) = self.request.take() {
                self.handed_out = true;
                return Ok(Some(request));
            }
        }
        Ok(None)
    }
}

/// 単方向ストリームの分類状態
enum UniStream {
    /// ストリームタイプの varint 待ち
    Pending(Vec<u8>),
    /// 制御ストリーム
    Control(ControlStream),
    /// SETTINGS 違反などで以後無視する制御ストリーム
    DeadControl,
    /// QPACK / プッシュ / 未知: 読み捨てる
    Drain,
}

/// 書き込み待ちデータ（ストリームのフロー制御で送り切れなかった分）
struct PendingWrite {
    data: Vec<u8>,
    written: usize,
    fin: bool,
}

/// HTTP/3 コネクション
pub struct Http3Connection {
    pub conn: quiche::Connection,
    qpack_decoder: QpackDecoder,
    qpack_encoder: QpackEncoder,
    uni_streams: HashMap<u64, UniStream>,
    requests: HashMap<u64, RequestStream>,
    pending_writes: HashMap<u64, PendingWrite>,
    store: ContentStore,
    trace: TraceSink,
    control_opened: bool,
}

impl Http3Connection {
    pub fn new(conn: quiche::Connection, store: ContentStore, trace: TraceSink) -> Self {
        Self {
            conn,
            qpack_decoder: QpackDecoder::new(),
            qpack_encoder: QpackEncoder::new(),
            uni_streams: HashMap::new(),
            requests: HashMap::new(),
            pending_writes: HashMap::new(),
            store,
            trace,
            control_opened: false,
        }
    }

    /// QUIC 確立後に一度だけ呼ばれ、サーバー制御ストリームを開く
    pub fn on_established(&mut self) -> Http3Result<()> {
        if self.control_opened || !self.conn.is_established() {
            return Ok(());
        }
        let mut buf = Vec::new();
        crate::http3::frame::encode_varint(&mut buf, stream_type::CONTROL);
        buf.extend_from_slice(
            &H3Frame::Settings(vec![
                (setting::QPACK_MAX_TABLE_CAPACITY, 0),
                (setting::QPACK_BLOCKED_STREAMS, 0),
            ])
            .encode(),
        );
        self.send_on_stream(SERVER_CONTROL_STREAM_ID, buf, false)?;
        self.control_opened = true;
        self.trace.event(Protocol::Http3, "control stream opened");
        Ok(())
    }

    /// 読み取り可能なストリームをすべて処理
    pub fn process_readable(&mut self) -> Http3Result<()> {
        let readable: Vec<u64> = self.conn.readable().collect();
        for stream_id in readable {
            let mut chunk = [0u8; 16 * 1024];
            loop {
                let (n, fin) = match self.conn.stream_recv(stream_id, &mut chunk) {
                    Ok(v) => v,
                    Err(quiche::Error::Done) => break,
                    Err(quiche::Error::StreamReset(_)) => {
                        self.requests.remove(&stream_id);
                        break;
                    }
                    Err(e) => return Err(Http3Error::Quic(e)),
                };
                self.on_stream_data(stream_id, &chunk[..n], fin)?;
                if fin {
                    break;
                }
            }
        }
        self.flush_pending()?;
        Ok(())
    }

    fn on_stream_data(&mut self, stream_id: u64, data: &[u8], fin: bool) -> Http3Result<()> {
        if is_client_bidi(stream_id) {
            self.on_request_data(stream_id, data, fin)
        } else if is_client_uni(stream_id) {
            self.on_uni_data(stream_id, data, fin);
            Ok(())
        } else {
            // 自分が開いたストリームからは読まない
            Ok(())
        }
    }

    fn on_request_data(&mut self, stream_id: u64, data: &[u8], fin: bool) -> Http3Result<()> {
        let stream = self
            .requests
            .entry(stream_id)
            .or_insert_with(RequestStream::new);
        match stream.feed(data, fin, &mut self.qpack_decoder) {
            Ok(Some(request)) => {
                self.requests.remove(&stream_id);
                self.trace.frame(
                    Direction::Recv,
                    request.protocol,
                    stream_id,
                    &format!("request {} /{}", request.method, request.path),
                );
                self.respond(stream_id, &request)?;
            }
            Ok(None) => {}
            Err(Http3Error::HeaderDecode(e)) => {
                warn!("stream {}: field section decode failed: {}", stream_id, e);
                self.requests.remove(&stream_id);
                let _ = self.conn.stream_shutdown(
                    stream_id,
                    quiche::Shutdown::Write,
                    QPACK_DECOMPRESSION_FAILED,
                );
            }
            Err(Http3Error::Truncated) => {
                warn!("stream {}: ended mid-frame", stream_id);
                self.requests.remove(&stream_id);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn on_uni_data(&mut self, stream_id: u64, data: &[u8], fin: bool) {
        let state = self
            .uni_streams
            .entry(stream_id)
            .or_insert_with(|| UniStream::Pending(Vec::new()));

        // ストリームタイプの varint が揃うまで蓄積
        if let UniStream::Pending(buf) = state {
            buf.extend_from_slice(data);
            let (st, consumed) = match decode_varint(buf) {
                Some(v) => v,
                None => return,
            };
            let rest = buf[consumed..].to_vec();
            let next = match st {
                stream_type::CONTROL => UniStream::Control(ControlStream::new()),
                stream_type::QPACK_ENCODER | stream_type::QPACK_DECODER => UniStream::Drain,
                // プッシュストリームは読み捨て (RFC 9114 Section 6.2.3)
                stream_type::PUSH => UniStream::Drain,
                // 未知のタイプも読み捨て
                _ => UniStream::Drain,
            };
            *state = next;
            self.feed_classified(stream_id, &rest, fin);
            return;
        }
        self.feed_classified(stream_id, data, fin);
    }

    fn feed_classified(&mut self, stream_id: u64, data: &[u8], fin: bool) {
        let state = match self.uni_streams.get_mut(&stream_id) {
            Some(state) => state,
            None => return,
        };
        if let UniStream::Control(control) = state {
            let had_settings = control.settings_received();
            match control.feed(data, fin) {
                Ok(()) => {
                    if !had_settings && control.settings_received() {
                        self.trace.event(Protocol::Http3, "client SETTINGS received");
                    }
                    if let Some(id) = control.goaway.take() {
                        self.trace
                            .event(Protocol::Http3, &format!("GOAWAY received (id {})", id));
                    }
                }
                Err(e) => {
                    warn!("control stream {}: {}", stream_id, e);
                    *state = UniStream::DeadControl;
                }
            }
        }
    }

    /// レスポンス送信（常にステータス 200）
    fn respond(&mut self, stream_id: u64, request: &Request) -> Http3Result<()> {
        // 正規化結果が空のパスはヘッダーのみで終端する
        if request.path.is_empty() {
            let section = self.qpack_encoder.encode_field_section(&[]);
            let frame = H3Frame::Headers(section).encode();
            self.trace.frame(
                Direction::Send,
                Protocol::Http3,
                stream_id,
                "HEADERS len=0 fin",
            );
            return self.send_on_stream(stream_id, frame, true);
        }

        let body = self.store.read_or_empty(&request.path);
        let content_type = content_type_for(&request.path);
        let section = self.qpack_encoder.encode_field_section(&[
            (b":status".as_slice(), b"200".as_slice()),
            (b"content-type".as_slice(), content_type.as_bytes()),
        ]);

        let mut out = H3Frame::Headers(section).encode();
        out.extend_from_slice(&H3Frame::Data(body.clone()).encode());
        self.trace.frame(
            Direction::Send,
            Protocol::Http3,
            stream_id,
            &format!("HEADERS + DATA len={} fin", body.len()),
        );
        self.send_on_stream(stream_id, out, true)
    }

    /// ストリームへ書き込み、送り切れなかった分を保持
    fn send_on_stream(&mut self, stream_id: u64, data: Vec<u8>, fin: bool) -> Http3Result<()> {
        let written = match self.conn.stream_send(stream_id, &data, fin) {
            Ok(n) => n,
            Err(quiche::Error::Done) => 0,
            Err(e) => return Err(Http3Error::Quic(e)),
        };
        if written < data.len() {
            self.pending_writes
                .insert(stream_id, PendingWrite { data, written, fin });
        }
        Ok(())
    }

    /// 書き込み待ちデータの再送
    pub fn flush_pending(&mut self) -> Http3Result<()> {
        let stream_ids: Vec<u64> = self.pending_writes.keys().copied().collect();
        for stream_id in stream_ids {
            let pending = match self.pending_writes.get_mut(&stream_id) {
                Some(p) => p,
                None => continue,
            };
            let written = match self
                .conn
                .stream_send(stream_id, &pending.data[pending.written..], pending.fin)
            {
                Ok(n) => n,
                Err(quiche::Error::Done) => continue,
                Err(quiche::Error::StreamReset(_)) | Err(quiche::Error::InvalidStreamState(_)) => {
                    self.pending_writes.remove(&stream_id);
                    continue;
                }
                Err(e) => return Err(Http3Error::Quic(e)),
            };
            pending.written += written;
            if pending.written >= pending.data.len() {
                self.pending_writes.remove(&stream_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_bytes() -> Vec<u8> {
        H3Frame::Settings(vec![(setting::QPACK_MAX_TABLE_CAPACITY, 0)]).encode()
    }

    #[test]
    fn test_control_stream_accepts_settings_first() {
        let mut control = ControlStream::new();
        control.feed(&settings_bytes(), false).unwrap();
        assert!(control.settings_received());
        assert_eq!(control.settings, vec![(setting::QPACK_MAX_TABLE_CAPACITY, 0)]);
    }

    #[test]
    fn test_control_stream_split_feed() {
        let bytes = settings_bytes();
        let mut control = ControlStream::new();
        control.feed(&bytes[..1], false).unwrap();
        assert!(!control.settings_received());
        control.feed(&bytes[1..], false).unwrap();
        assert!(control.settings_received());
    }

    #[test]
    fn test_control_stream_requires_settings_first() {
        // SETTINGS より先に GOAWAY
        let mut control = ControlStream::new();
        let result = control.feed(&H3Frame::GoAway(0).encode(), false);
        assert!(matches!(result, Err(Http3Error::MissingSettings)));
    }

    #[test]
    fn test_control_stream_goaway_after_settings() {
        let mut control = ControlStream::new();
        control.feed(&settings_bytes(), false).unwrap();
        control.feed(&H3Frame::GoAway(8).encode(), false).unwrap();
        assert_eq!(control.goaway, Some(8));
    }

    #[test]
    fn test_control_stream_fin_mid_frame() {
        let bytes = settings_bytes();
        let mut control = ControlStream::new();
        let result = control.feed(&bytes[..bytes.len() - 1], true);
        assert!(matches!(result, Err(Http3Error::Truncated)));
    }

    fn request_headers_block(fields: &[(&[u8], &[u8])]) -> Vec<u8> {
        H3Frame::Headers(QpackEncoder::new().encode_field_section(fields)).encode()
    }

    #[test]
    fn test_request_stream_completes_on_fin() {
        let bytes = request_headers_block(&[
            (b":method".as_slice(), b"GET".as_slice()),
            (b":path".as_slice(), b"/index.html".as_slice()),
        ]);
        let mut qpack = QpackDecoder::new();
        let mut stream = RequestStream::new();
        let request = stream.feed(&bytes, true, &mut qpack).unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "index.html");
        assert_eq!(request.protocol, Protocol::Http3);
    }

    #[test]
    fn test_request_stream_waits_for_fin() {
        let bytes = request_headers_block(&[(b":path".as_slice(), b"/".as_slice())]);
        let mut qpack = QpackDecoder::new();
        let mut stream = RequestStream::new();
        // FIN が来るまでは未完成
        assert!(stream.feed(&bytes, false, &mut qpack).unwrap().is_none());
        let request = stream.feed(&[], true, &mut qpack).unwrap().unwrap();
        assert_eq!(request.path, "index.html");
        // 再取り出しは無効
        assert!(stream.feed(&[], true, &mut qpack).unwrap().is_none());
    }

    #[test]
    fn test_request_stream_data_frame_ignored() {
        let mut bytes = request_headers_block(&[(b":path".as_slice(), b"/a.html".as_slice())]);
        bytes.extend_from_slice(&H3Frame::Data(b"ignored body".to_vec()).encode());
        let mut qpack = QpackDecoder::new();
        let mut stream = RequestStream::new();
        let request = stream.feed(&bytes, true, &mut qpack).unwrap().unwrap();
        assert_eq!(request.path, "a.html");
    }

    #[test]
    fn test_request_stream_fin_mid_frame() {
        let bytes = request_headers_block(&[(b":path".as_slice(), b"/".as_slice())]);
        let mut qpack = QpackDecoder::new();
        let mut stream = RequestStream::new();
        let result = stream.feed(&bytes[..bytes.len() - 1], true, &mut qpack);
        assert!(matches!(result, Err(Http3Error::Truncated)));
    }

    #[test]
    fn test_request_stream_decode_failure_is_local() {
        // ポストベース参照を含む不正なフィールドセクション
        let bytes = H3Frame::Headers(vec![0x00, 0x00, 0x10]).encode();
        let mut qpack = QpackDecoder::new();
        let mut stream = RequestStream::new();
        let result = stream.feed(&bytes, true, &mut qpack);
        assert!(matches!(result, Err(Http3Error::HeaderDecode(_))));
    }

    #[test]
    fn test_stream_id_roles() {
        assert!(is_client_bidi(0));
        assert!(is_client_bidi(4));
        assert!(is_client_uni(2));
        assert!(is_client_uni(6));
        assert!(!is_client_bidi(SERVER_CONTROL_STREAM_ID));
    }
}
