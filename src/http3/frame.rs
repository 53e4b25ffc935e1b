//! # HTTP/3 フレーム (RFC 9114 Section 7)
//!
//! フレームは可変長整数 2 つ（タイプ、ペイロード長）にペイロードが
//! 続くレコード形式です。QUIC ストリームはフレーム境界を保存しない
//! ため、デコードは逐次的で、バイト不足は `Ok(None)` を返します。

use crate::http3::error::{Http3Error, Http3Result};

/// HTTP/3 フレームタイプ (RFC 9114 Section 7.2)
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H3FrameType {
    Data = 0x00,
    Headers = 0x01,
    CancelPush = 0x03,
    Settings = 0x04,
    PushPromise = 0x05,
    GoAway = 0x07,
    MaxPushId = 0x0d,
}

impl H3FrameType {
    /// ワイヤ上のタイプ値から変換（未知の値は None）
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::Headers),
            0x03 => Some(Self::CancelPush),
            0x04 => Some(Self::Settings),
            0x05 => Some(Self::PushPromise),
            0x07 => Some(Self::GoAway),
            0x0d => Some(Self::MaxPushId),
            _ => None,
        }
    }
}

/// 単方向ストリームタイプ (RFC 9114 Section 6.2)
pub mod stream_type {
    /// 制御ストリーム
    pub const CONTROL: u64 = 0x00;
    /// プッシュストリーム
    pub const PUSH: u64 = 0x01;
    /// QPACK エンコーダストリーム
    pub const QPACK_ENCODER: u64 = 0x02;
    /// QPACK デコーダストリーム
    pub const QPACK_DECODER: u64 = 0x03;
}

/// SETTINGS 識別子 (RFC 9114 Section 7.2.4.1)
pub mod setting {
    pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
    pub const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
    pub const QPACK_BLOCKED_STREAMS: u64 = 0x07;
}

/// デコード済みフレーム
///
/// 既知タイプは固有のアーム、未知タイプは `Unknown`。未知フレームは
/// 読み飛ばされます (RFC 9114 Section 9)。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H3Frame {
    Data(Vec<u8>),
    /// QPACK エンコード済みヘッダーブロック
    Headers(Vec<u8>),
    Settings(Vec<(u64, u64)>),
    GoAway(u64),
    CancelPush(u64),
    MaxPushId(u64),
    Unknown { frame_type: u64, payload: Vec<u8> },
}

impl H3Frame {
    /// バッファ先頭から 1 フレームをデコード
    ///
    /// バイトが足りない場合は `Ok(None)`。成功時は消費バイト数を
    /// あわせて返します。
    pub fn decode(data: &[u8]) -> Http3Result<Option<(Self, usize)>> {
        let (frame_type, type_len) = match decode_varint(data) {
            Some(v) => v,
            None => return Ok(None),
        };
        let (length, len_len) = match decode_varint(&data[type_len..]) {
            Some(v) => v,
            None => return Ok(None),
        };

        let header_len = type_len + len_len;
        let total = header_len + length as usize;
        if data.len() < total {
            return Ok(None);
        }
        let payload = &data[header_len..total];

        let frame = match H3FrameType::from_u64(frame_type) {
            Some(H3FrameType::Data) => Self::Data(payload.to_vec()),
            Some(H3FrameType::Headers) => Self::Headers(payload.to_vec()),
            Some(H3FrameType::Settings) => Self::decode_settings(payload)?,
            Some(H3FrameType::GoAway) => {
                let (id, _) = require_varint(payload, "GOAWAY")?;
                Self::GoAway(id)
            }
            Some(H3FrameType::CancelPush) => {
                let (id, _) = require_varint(payload, "CANCEL_PUSH")?;
                Self::CancelPush(id)
            }
            Some(H3FrameType::MaxPushId) => {
                let (id, _) = require_varint(payload, "MAX_PUSH_ID")?;
                Self::MaxPushId(id)
            }
            // PUSH_PROMISE はサーバーが受信しないフレーム
            Some(H3FrameType::PushPromise) | None => Self::Unknown {
                frame_type,
                payload: payload.to_vec(),
            },
        };

        Ok(Some((frame, total)))
    }

    fn decode_settings(payload: &[u8]) -> Http3Result<Self> {
        let mut settings = Vec::new();
        let mut pos = 0;
        while pos < payload.len() {
            let (id, id_len) = require_varint(&payload[pos..], "SETTINGS")?;
            pos += id_len;
            let (value, value_len) = require_varint(&payload[pos..], "SETTINGS")?;
            pos += value_len;
            settings.push((id, value));
        }
        Ok(Self::Settings(settings))
    }

    /// フレームをワイヤ形式にエンコード
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(payload) => encode_with_payload(H3FrameType::Data as u64, payload),
            Self::Headers(payload) => encode_with_payload(H3FrameType::Headers as u64, payload),
            Self::Settings(settings) => {
                let mut payload = Vec::new();
                for &(id, value) in settings {
                    encode_varint(&mut payload, id);
                    encode_varint(&mut payload, value);
                }
                encode_with_payload(H3FrameType::Settings as u64, &payload)
            }
            Self::GoAway(id) => encode_with_varint(H3FrameType::GoAway as u64, *id),
            Self::CancelPush(id) => encode_with_varint(H3FrameType::CancelPush as u64, *id),
            Self::MaxPushId(id) => encode_with_varint(H3FrameType::MaxPushId as u64, *id),
            Self::Unknown { frame_type, payload } => encode_with_payload(*frame_type, payload),
        }
    }
}

fn encode_with_payload(frame_type: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 16);
    encode_varint(&mut buf, frame_type);
    encode_varint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);
    buf
}

fn encode_with_varint(frame_type: u64, value: u64) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_varint(&mut payload, value);
    encode_with_payload(frame_type, &payload)
}

fn require_varint(data: &[u8], frame: &str) -> Http3Result<(u64, usize)> {
    decode_varint(data)
        .ok_or_else(|| Http3Error::InvalidFrame(format!("{} payload too short", frame)))
}

/// QUIC 可変長整数デコード (RFC 9000 Section 16)
///
/// 先頭 2 ビットが長さを示します。バイト不足は `None`。
pub fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let first = *data.first()?;
    let len = 1usize << (first >> 6);
    if data.len() < len {
        return None;
    }
    let mut value = u64::from(first & 0x3f);
    for &byte in &data[1..len] {
        value = (value << 8) | u64::from(byte);
    }
    Some((value, len))
}

/// QUIC 可変長整数エンコード (RFC 9000 Section 16)
pub fn encode_varint(buf: &mut Vec<u8>, value: u64) {
    if value < 0x40 {
        buf.push(value as u8);
    } else if value < 0x4000 {
        buf.extend_from_slice(&[0x40 | (value >> 8) as u8, value as u8]);
    } else if value < 0x4000_0000 {
        buf.extend_from_slice(&[
            0x80 | (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]);
    } else {
        buf.extend_from_slice(&[
            0xc0 | (value >> 56) as u8,
            (value >> 48) as u8,
            (value >> 40) as u8,
            (value >> 32) as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_rfc_vectors() {
        // RFC 9000 Appendix A.1
        assert_eq!(decode_varint(&[0x25]), Some((37, 1)));
        assert_eq!(decode_varint(&[0x7b, 0xbd]), Some((15_293, 2)));
        assert_eq!(decode_varint(&[0x9d, 0x7f, 0x3e, 0x7d]), Some((494_878_333, 4)));
        assert_eq!(
            decode_varint(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]),
            Some((151_288_809_941_952_652, 8))
        );
    }

    #[test]
    fn test_varint_roundtrip() {
        for value in [0u64, 1, 63, 64, 16_383, 16_384, 0x3fff_ffff, 0x4000_0000] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(decode_varint(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn test_varint_short_buffer() {
        assert_eq!(decode_varint(&[]), None);
        assert_eq!(decode_varint(&[0x7b]), None);
        assert_eq!(decode_varint(&[0xc2, 0x19, 0x7c]), None);
    }

    #[test]
    fn test_data_frame_roundtrip() {
        let frame = H3Frame::Data(b"hello".to_vec());
        let encoded = frame.encode();
        let (decoded, consumed) = H3Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_settings_frame_roundtrip() {
        let frame = H3Frame::Settings(vec![
            (setting::QPACK_MAX_TABLE_CAPACITY, 0),
            (setting::QPACK_BLOCKED_STREAMS, 0),
        ]);
        let encoded = frame.encode();
        let (decoded, _) = H3Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_partial_frame_needs_more() {
        let encoded = H3Frame::Headers(b"0123456789".to_vec()).encode();
        // フレームヘッダーのみ、ペイロード途中、完全、の 3 段階
        assert!(H3Frame::decode(&encoded[..1]).unwrap().is_none());
        assert!(H3Frame::decode(&encoded[..5]).unwrap().is_none());
        assert!(H3Frame::decode(&encoded).unwrap().is_some());
    }

    #[test]
    fn test_unknown_frame_preserved() {
        // グリースタイプ 0x21 (RFC 9114 Section 7.2.8)
        let frame = H3Frame::Unknown {
            frame_type: 0x21,
            payload: b"grease".to_vec(),
        };
        let encoded = frame.encode();
        let (decoded, _) = H3Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_goaway_frame() {
        let encoded = H3Frame::GoAway(4).encode();
        let (decoded, _) = H3Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, H3Frame::GoAway(4));
    }

    #[test]
    fn test_goaway_empty_payload_invalid() {
        // タイプ 0x07、長さ 0
        let result = H3Frame::decode(&[0x07, 0x00]);
        assert!(matches!(result, Err(Http3Error::InvalidFrame(_))));
    }
}
