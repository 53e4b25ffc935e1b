//! # HTTP/2 フレームデコーダ
//!
//! 完全なペイロードを持つフレームを `Frame` へ変換します。
//! パディングと優先度プレフィックスはここで取り除かれます。

use crate::http2::error::{Http2Error, Http2Result};
use crate::http2::frame::types::{flags, Frame, FrameHeader, FrameType};
use crate::http2::settings::DEFAULT_MAX_FRAME_SIZE;

/// フレームデコーダ
pub struct FrameDecoder {
    /// 受け入れる最大ペイロード長
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE as usize,
        }
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// ヘッダーのサイズ検証
    pub fn check_header(&self, header: &FrameHeader) -> Http2Result<()> {
        if header.length as usize > self.max_frame_size {
            return Err(Http2Error::FrameTooLarge(
                header.length as usize,
                self.max_frame_size,
            ));
        }
        Ok(())
    }

    /// ヘッダーと完全なペイロードからフレームをデコード
    pub fn decode(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        debug_assert_eq!(header.length as usize, payload.len());

        let frame_type = match FrameType::from_u8(header.frame_type) {
            Some(t) => t,
            None => {
                return Ok(Frame::Unknown {
                    frame_type: header.frame_type,
                    flags: header.flags,
                    stream_id: header.stream_id,
                    payload: payload.to_vec(),
                });
            }
        };

        match frame_type {
            FrameType::Data => self.decode_data(header, payload),
            FrameType::Headers => self.decode_headers(header, payload),
            FrameType::Priority => {
                require_stream(header, "PRIORITY")?;
                require_len(payload, 5, "PRIORITY")?;
                Ok(Frame::Priority { stream_id: header.stream_id })
            }
            FrameType::RstStream => {
                require_stream(header, "RST_STREAM")?;
                require_len(payload, 4, "RST_STREAM")?;
                Ok(Frame::RstStream {
                    stream_id: header.stream_id,
                    error_code: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }
            FrameType::Settings => self.decode_settings(header, payload),
            FrameType::PushPromise => {
                require_stream(header, "PUSH_PROMISE")?;
                Ok(Frame::PushPromise { stream_id: header.stream_id })
            }
            FrameType::Ping => {
                require_len(payload, 8, "PING")?;
                let mut data = [0u8; 8];
                data.copy_from_slice(payload);
                Ok(Frame::Ping {
                    ack: header.has_flag(flags::ACK),
                    payload: data,
                })
            }
            FrameType::GoAway => {
                if payload.len() < 8 {
                    return Err(Http2Error::InvalidFrame(format!(
                        "GOAWAY payload too short: {}",
                        payload.len()
                    )));
                }
                Ok(Frame::GoAway {
                    last_stream_id: u32::from_be_bytes([
                        payload[0], payload[1], payload[2], payload[3],
                    ]) & 0x7FFF_FFFF,
                    error_code: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                })
            }
            FrameType::WindowUpdate => {
                require_len(payload, 4, "WINDOW_UPDATE")?;
                Ok(Frame::WindowUpdate {
                    stream_id: header.stream_id,
                    increment: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                        & 0x7FFF_FFFF,
                })
            }
            FrameType::Continuation => {
                require_stream(header, "CONTINUATION")?;
                Ok(Frame::Continuation {
                    stream_id: header.stream_id,
                    end_headers: header.has_flag(flags::END_HEADERS),
                    fragment: payload.to_vec(),
                })
            }
        }
    }

    fn decode_data(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        require_stream(header, "DATA")?;
        let data = strip_padding(header, payload, 0)?;
        Ok(Frame::Data {
            stream_id: header.stream_id,
            end_stream: header.has_flag(flags::END_STREAM),
            data: data.to_vec(),
        })
    }

    fn decode_headers(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        require_stream(header, "HEADERS")?;
        // PRIORITY フラグ時は 5 バイトの優先度フィールドを読み飛ばす
        let priority_len = if header.has_flag(flags::PRIORITY) { 5 } else { 0 };
        let fragment = strip_padding(header, payload, priority_len)?;
        Ok(Frame::Headers {
            stream_id: header.stream_id,
            end_stream: header.has_flag(flags::END_STREAM),
            end_headers: header.has_flag(flags::END_HEADERS),
            fragment: fragment.to_vec(),
        })
    }

    fn decode_settings(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id != 0 {
            return Err(Http2Error::InvalidFrame(
                "SETTINGS on non-zero stream".to_string(),
            ));
        }
        let ack = header.has_flag(flags::ACK);
        if ack && !payload.is_empty() {
            return Err(Http2Error::InvalidFrame(
                "SETTINGS ack with payload".to_string(),
            ));
        }
        if payload.len() % 6 != 0 {
            return Err(Http2Error::InvalidFrame(format!(
                "SETTINGS payload length {} not a multiple of 6",
                payload.len()
            )));
        }
        let settings = payload
            .chunks_exact(6)
            .map(|chunk| {
                (
                    u16::from_be_bytes([chunk[0], chunk[1]]),
                    u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]),
                )
            })
            .collect();
        Ok(Frame::Settings { ack, settings })
    }
}

/// ストリーム ID 0 を拒否
fn require_stream(header: &FrameHeader, name: &str) -> Http2Result<()> {
    if header.stream_id == 0 {
        return Err(Http2Error::InvalidFrame(format!("{} on stream 0", name)));
    }
    Ok(())
}

/// 固定長ペイロードの検証
fn require_len(payload: &[u8], expected: usize, name: &str) -> Http2Result<()> {
    if payload.len() != expected {
        return Err(Http2Error::InvalidFrame(format!(
            "{} payload must be {} bytes, got {}",
            name,
            expected,
            payload.len()
        )));
    }
    Ok(())
}

/// PADDED フラグとプレフィックスを処理して実データ部を返す
fn strip_padding<'a>(
    header: &FrameHeader,
    payload: &'a [u8],
    prefix_len: usize,
) -> Http2Result<&'a [u8]> {
    let mut start = 0;
    let mut end = payload.len();

    if header.has_flag(flags::PADDED) {
        if payload.is_empty() {
            return Err(Http2Error::InvalidFrame("PADDED frame with no pad length".to_string()));
        }
        let pad_len = payload[0] as usize;
        start = 1;
        // パディングがデータ部を食い潰すのは不正 (RFC 7540 Section 6.1)
        if start + prefix_len + pad_len > end {
            return Err(Http2Error::InvalidFrame("padding exceeds payload".to_string()));
        }
        end -= pad_len;
    }

    start += prefix_len;
    if start > end {
        return Err(Http2Error::InvalidFrame("frame prefix exceeds payload".to_string()));
    }
    Ok(&payload[start..end])
}
