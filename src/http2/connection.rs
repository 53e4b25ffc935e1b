//! # HTTP/2 コネクション処理 (RFC 7540)
//!
//! 1 接続 = 1 インスタンス。プリフェース検証から始まり、フレームを
//! 読み取ってストリームごとのアセンブラへ振り分け、完成した
//! リクエストに応答します。HPACK デコーダは接続フィールドとして
//! 保持され、すべてのヘッダーブロックが受信順に通過します。

use std::collections::HashMap;

use ftlog::warn;

use crate::content::ContentStore;
use crate::http2::assembler::{RequestAssembler, StreamPhase};
use crate::http2::error::{error_code, Http2Error, Http2Result};
use crate::http2::frame::{Frame, FrameDecoder, FrameEncoder, FrameHeader, FRAME_HEADER_LEN};
use crate::http2::hpack::{HpackDecoder, HpackEncoder};
use crate::http2::settings::Http2Settings;
use crate::request::{content_type_for, Protocol, Request};
use crate::trace::{Direction, TraceSink};
use crate::transport::Transport;

/// コネクションプリフェース (RFC 7540 Section 3.5)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// 読み込みチャンクサイズ
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// HTTP/2 コネクション
pub struct Http2Connection<T: Transport> {
    transport: T,
    frame_decoder: FrameDecoder,
    frame_encoder: FrameEncoder,
    /// 接続ごとの HPACK デコーダ（ブロック間で動的テーブルを共有）
    hpack_decoder: HpackDecoder,
    hpack_encoder: HpackEncoder,
    streams: HashMap<u32, RequestAssembler>,
    store: ContentStore,
    trace: TraceSink,
    settings: Http2Settings,
    /// 受信済み未消費バイト
    pending: Vec<u8>,
    consumed: usize,
    /// 再利用する読み込みバッファ
    chunk: Vec<u8>,
}

impl<T: Transport> Http2Connection<T> {
    pub fn new(transport: T, store: ContentStore, trace: TraceSink) -> Self {
        Self {
            transport,
            frame_decoder: FrameDecoder::default(),
            frame_encoder: FrameEncoder::new(),
            hpack_decoder: HpackDecoder::default(),
            hpack_encoder: HpackEncoder::new(),
            streams: HashMap::new(),
            store,
            trace,
            settings: Http2Settings::default(),
            pending: Vec::new(),
            consumed: 0,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// 接続を最後まで処理
    ///
    /// フレーム境界での切断と GOAWAY は正常終了として `Ok(())`。
    pub async fn serve(&mut self) -> Http2Result<()> {
        self.handshake().await?;
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(Http2Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            if !self.dispatch(frame).await? {
                return Ok(());
            }
        }
    }

    /// プリフェース検証とサーバー SETTINGS 送信 (RFC 7540 Section 3.5)
    async fn handshake(&mut self) -> Http2Result<()> {
        self.fill(CONNECTION_PREFACE.len()).await?;
        let preface = &self.pending[self.consumed..self.consumed + CONNECTION_PREFACE.len()];
        if preface != CONNECTION_PREFACE {
            return Err(Http2Error::InvalidPreface);
        }
        self.consumed += CONNECTION_PREFACE.len();
        self.compact();
        self.trace.event(Protocol::Http2, "connection preface accepted");

        let frame = self.frame_encoder.encode_settings(&self.settings.to_entries());
        self.trace
            .frame(Direction::Send, Protocol::Http2, 0, "SETTINGS");
        self.write(frame).await?;
        Ok(())
    }

    /// フレームを 1 つ処理。`false` で接続終了。
    async fn dispatch(&mut self, frame: Frame) -> Http2Result<bool> {
        match frame {
            Frame::Settings { ack: false, .. } => {
                let out = self.frame_encoder.encode_settings_ack();
                self.trace
                    .frame(Direction::Send, Protocol::Http2, 0, "SETTINGS ack");
                self.write(out).await?;
            }
            Frame::Settings { ack: true, .. } => {}
            Frame::Ping { ack: false, payload } => {
                let out = self.frame_encoder.encode_ping_ack(payload);
                self.trace
                    .frame(Direction::Send, Protocol::Http2, 0, "PING ack");
                self.write(out).await?;
            }
            Frame::Ping { ack: true, .. } => {}
            Frame::GoAway { error_code, .. } => {
                self.trace.event(
                    Protocol::Http2,
                    &format!("GOAWAY received (code {:#x})", error_code),
                );
                return Ok(false);
            }
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                fragment,
            } => {
                let assembler = self
                    .streams
                    .entry(stream_id)
                    .or_insert_with(RequestAssembler::new);
                // 応答済みストリーム ID の再利用はプロトコル違反
                if assembler.phase() == StreamPhase::Complete {
                    warn!("stream {}: HEADERS on closed stream ignored", stream_id);
                } else {
                    let block = assembler.on_headers(&fragment, end_headers, end_stream);
                    self.finish_header_block(stream_id, block).await?;
                }
            }
            Frame::Continuation {
                stream_id,
                end_headers,
                fragment,
            } => {
                if let Some(assembler) = self.streams.get_mut(&stream_id) {
                    let block = assembler.on_continuation(&fragment, end_headers);
                    self.finish_header_block(stream_id, block).await?;
                }
            }
            Frame::Data {
                stream_id,
                end_stream,
                ..
            } => {
                if let Some(assembler) = self.streams.get_mut(&stream_id) {
                    if assembler.phase() == StreamPhase::Complete {
                        warn!("stream {}: DATA on closed stream ignored", stream_id);
                    } else {
                        assembler.on_data(end_stream);
                        self.flush_completed(stream_id).await?;
                    }
                }
            }
            Frame::RstStream { stream_id, .. } => {
                // 組み立て中のストリームだけ破棄。応答済みマーカーは
                // ID 再利用を防ぐため残す。
                if let Some(assembler) = self.streams.get(&stream_id) {
                    if assembler.phase() != StreamPhase::Complete {
                        self.streams.remove(&stream_id);
                    }
                }
            }
            // フロー制御と優先度は追跡しない
            Frame::WindowUpdate { .. } | Frame::Priority { .. } => {}
            Frame::PushPromise { .. } => {}
            // 未知フレームは読み飛ばす (RFC 7540 Section 4.1)
            Frame::Unknown { .. } => {}
        }
        Ok(true)
    }

    /// 完成したヘッダーブロックをデコードし、応答可能なら応答
    ///
    /// デコード失敗はストリーム局所のエラーとして RST_STREAM
    /// (COMPRESSION_ERROR) を返し、接続は継続します。
    async fn finish_header_block(
        &mut self,
        stream_id: u32,
        block: Option<Vec<u8>>,
    ) -> Http2Result<()> {
        let block = match block {
            Some(block) => block,
            None => return Ok(()),
        };
        match self.hpack_decoder.decode(&block) {
            Ok(fields) => {
                let request = Request::from_fields(Protocol::Http2, &fields);
                self.trace.frame(
                    Direction::Recv,
                    request.protocol,
                    u64::from(stream_id),
                    &format!(
                        "request {} /{} ({} headers)",
                        request.method,
                        request.path,
                        request.headers.len()
                    ),
                );
                if let Some(assembler) = self.streams.get_mut(&stream_id) {
                    assembler.headers_decoded(request);
                }
                self.flush_completed(stream_id).await?;
            }
            Err(e) => {
                warn!("stream {}: header block decode failed: {}", stream_id, e);
                self.streams.remove(&stream_id);
                let out = self
                    .frame_encoder
                    .encode_rst_stream(stream_id, error_code::COMPRESSION_ERROR);
                self.trace.frame(
                    Direction::Send,
                    Protocol::Http2,
                    u64::from(stream_id),
                    "RST_STREAM COMPRESSION_ERROR",
                );
                self.write(out).await?;
            }
        }
        Ok(())
    }

    /// ストリームが完了していれば応答する
    ///
    /// 応答後もアセンブラは保持し続けます。完了フェーズのまま残る
    /// ことで同じストリーム ID の再利用を防ぎ、リクエストの取り出し
    /// は `take_request` が一度だけに抑えます。
    async fn flush_completed(&mut self, stream_id: u32) -> Http2Result<()> {
        let request = match self.streams.get_mut(&stream_id) {
            Some(assembler) => assembler.take_request(),
            None => None,
        };
        if let Some(request) = request {
            self.respond(stream_id, &request).await?;
        }
        Ok(())
    }

    /// レスポンス送信（常にステータス 200）
    async fn respond(&mut self, stream_id: u32, request: &Request) -> Http2Result<()> {
        // 正規化結果が空のパスはヘッダーのみで終端する
        if request.path.is_empty() {
            let frame = self.frame_encoder.encode_headers(stream_id, &[], true, true);
            self.trace.frame(
                Direction::Send,
                Protocol::Http2,
                u64::from(stream_id),
                "HEADERS len=0 end_stream",
            );
            return self.write(frame).await;
        }

        let body = self.store.read_or_empty(&request.path);
        let content_type = content_type_for(&request.path);
        let block = self.hpack_encoder.encode(&[
            (b":status".as_slice(), b"200".as_slice()),
            (b"content-type".as_slice(), content_type.as_bytes()),
        ]);

        let headers = self.frame_encoder.encode_headers(stream_id, &block, true, false);
        self.trace.frame(
            Direction::Send,
            Protocol::Http2,
            u64::from(stream_id),
            &format!("HEADERS len={}", block.len()),
        );
        self.write(headers).await?;

        let data = self.frame_encoder.encode_data(stream_id, &body, true);
        self.trace.frame(
            Direction::Send,
            Protocol::Http2,
            u64::from(stream_id),
            &format!("DATA len={} end_stream", body.len()),
        );
        self.write(data).await
    }

    /// フレームを 1 つ読み取る
    ///
    /// フレーム境界での EOF は `ConnectionClosed`、ヘッダーまたは
    /// ペイロード途中での EOF は `Truncated`。
    async fn read_frame(&mut self) -> Http2Result<Frame> {
        self.fill(FRAME_HEADER_LEN).await?;
        let mut header_bytes = [0u8; FRAME_HEADER_LEN];
        header_bytes
            .copy_from_slice(&self.pending[self.consumed..self.consumed + FRAME_HEADER_LEN]);
        let header = FrameHeader::decode(&header_bytes);
        self.frame_decoder.check_header(&header)?;

        let total = FRAME_HEADER_LEN + header.length as usize;
        self.fill(total).await?;
        let payload_start = self.consumed + FRAME_HEADER_LEN;
        let frame = self
            .frame_decoder
            .decode(&header, &self.pending[payload_start..self.consumed + total])?;
        self.consumed += total;
        self.compact();

        self.trace.frame(
            Direction::Recv,
            Protocol::Http2,
            u64::from(frame.stream_id()),
            &format!("{} len={}", frame.name(), header.length),
        );
        Ok(frame)
    }

    /// 未消費バイトが `need` に達するまで読み込む
    async fn fill(&mut self, need: usize) -> Http2Result<()> {
        while self.pending.len() - self.consumed < need {
            let chunk = std::mem::take(&mut self.chunk);
            let (res, chunk) = self.transport.read_buf(chunk).await;
            self.chunk = chunk;
            let n = res?;
            if n == 0 {
                return Err(if self.pending.len() == self.consumed {
                    Http2Error::ConnectionClosed
                } else {
                    Http2Error::Truncated
                });
            }
            self.pending.extend_from_slice(&self.chunk[..n]);
        }
        Ok(())
    }

    fn compact(&mut self) {
        self.pending.drain(..self.consumed);
        self.consumed = 0;
    }

    async fn write(&mut self, buf: Vec<u8>) -> Http2Result<()> {
        let (res, _) = self.transport.write_all_buf(buf).await;
        res?;
        Ok(())
    }
}
