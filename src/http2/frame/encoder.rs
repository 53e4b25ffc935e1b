//! # HTTP/2 フレームエンコーダ
//!
//! サーバーが送信するフレームのワイヤ形式を生成します。

use crate::http2::frame::types::{flags, FrameHeader, FrameType};

/// フレームエンコーダ
#[derive(Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    fn encode_frame(
        &self,
        frame_type: FrameType,
        frame_flags: u8,
        stream_id: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let header = FrameHeader {
            length: payload.len() as u32,
            frame_type: frame_type as u8,
            flags: frame_flags,
            stream_id,
        };
        let mut buf = Vec::with_capacity(payload.len() + 9);
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        buf
    }

    /// DATA フレーム
    pub fn encode_data(&self, stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
        let f = if end_stream { flags::END_STREAM } else { 0 };
        self.encode_frame(FrameType::Data, f, stream_id, data)
    }

    /// HEADERS フレーム（ヘッダーブロックはエンコード済み）
    pub fn encode_headers(
        &self,
        stream_id: u32,
        fragment: &[u8],
        end_headers: bool,
        end_stream: bool,
    ) -> Vec<u8> {
        let mut f = 0;
        if end_headers {
            f |= flags::END_HEADERS;
        }
        if end_stream {
            f |= flags::END_STREAM;
        }
        self.encode_frame(FrameType::Headers, f, stream_id, fragment)
    }

    /// SETTINGS フレーム
    pub fn encode_settings(&self, entries: &[(u16, u32)]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(entries.len() * 6);
        for &(id, value) in entries {
            payload.extend_from_slice(&id.to_be_bytes());
            payload.extend_from_slice(&value.to_be_bytes());
        }
        self.encode_frame(FrameType::Settings, 0, 0, &payload)
    }

    /// SETTINGS 確認応答
    pub fn encode_settings_ack(&self) -> Vec<u8> {
        self.encode_frame(FrameType::Settings, flags::ACK, 0, &[])
    }

    /// PING 確認応答（受信ペイロードをそのまま返す）
    pub fn encode_ping_ack(&self, payload: [u8; 8]) -> Vec<u8> {
        self.encode_frame(FrameType::Ping, flags::ACK, 0, &payload)
    }

    /// RST_STREAM フレーム
    pub fn encode_rst_stream(&self, stream_id: u32, error_code: u32) -> Vec<u8> {
        self.encode_frame(FrameType::RstStream, 0, stream_id, &error_code.to_be_bytes())
    }

    /// GOAWAY フレーム
    pub fn encode_goaway(&self, last_stream_id: u32, error_code: u32) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
        payload.extend_from_slice(&error_code.to_be_bytes());
        self.encode_frame(FrameType::GoAway, 0, 0, &payload)
    }
}
