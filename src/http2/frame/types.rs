//! # HTTP/2 フレーム型定義 (RFC 7540 Section 4, 6)
//!
//! 9 バイトのフレームヘッダーと、既知フレーム + `Unknown` からなる
//! 閉じたフレーム型を定義します。

/// フレームヘッダー長 (RFC 7540 Section 4.1)
pub const FRAME_HEADER_LEN: usize = 9;

/// フレームタイプ識別子
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    /// ワイヤ上のタイプ値から変換（未知の値は None）
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Data),
            0x1 => Some(Self::Headers),
            0x2 => Some(Self::Priority),
            0x3 => Some(Self::RstStream),
            0x4 => Some(Self::Settings),
            0x5 => Some(Self::PushPromise),
            0x6 => Some(Self::Ping),
            0x7 => Some(Self::GoAway),
            0x8 => Some(Self::WindowUpdate),
            0x9 => Some(Self::Continuation),
            _ => None,
        }
    }
}

/// フレームフラグ (RFC 7540 Section 6)
pub mod flags {
    /// DATA / HEADERS: ストリーム終端
    pub const END_STREAM: u8 = 0x1;
    /// SETTINGS / PING: 確認応答
    pub const ACK: u8 = 0x1;
    /// HEADERS / CONTINUATION: ヘッダーブロック終端
    pub const END_HEADERS: u8 = 0x4;
    /// DATA / HEADERS: パディングあり
    pub const PADDED: u8 = 0x8;
    /// HEADERS: 優先度フィールドあり
    pub const PRIORITY: u8 = 0x20;
}

/// フレームヘッダー
///
/// ```text
/// +-----------------------------------------------+
/// |                 Length (24)                   |
/// +---------------+---------------+---------------+
/// |   Type (8)    |   Flags (8)   |
/// +-+-------------+---------------+-------------------------------+
/// |R|                 Stream Identifier (31)                      |
/// +=+=============================================================+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// ペイロード長
    pub length: u32,
    /// タイプ（生の値、未知タイプも保持）
    pub frame_type: u8,
    /// フラグ
    pub flags: u8,
    /// ストリーム ID（予約ビットはマスク済み）
    pub stream_id: u32,
}

impl FrameHeader {
    /// 9 バイトからヘッダーをデコード
    pub fn decode(buf: &[u8; FRAME_HEADER_LEN]) -> Self {
        let length = u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]);
        let stream_id =
            u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7FFF_FFFF;
        Self {
            length,
            frame_type: buf[3],
            flags: buf[4],
            stream_id,
        }
    }

    /// ヘッダーを 9 バイトにエンコード
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0] = (self.length >> 16) as u8;
        buf[1] = (self.length >> 8) as u8;
        buf[2] = self.length as u8;
        buf[3] = self.frame_type;
        buf[4] = self.flags;
        buf[5..9].copy_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
        buf
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// デコード済みフレーム
///
/// 既知タイプはすべて固有のアームを持ち、未知タイプは `Unknown` に
/// 落ちます。未知フレームは致命的エラーにせず読み飛ばします。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        end_stream: bool,
        data: Vec<u8>,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        fragment: Vec<u8>,
    },
    Priority {
        stream_id: u32,
    },
    RstStream {
        stream_id: u32,
        error_code: u32,
    },
    Settings {
        ack: bool,
        settings: Vec<(u16, u32)>,
    },
    PushPromise {
        stream_id: u32,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        error_code: u32,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        end_headers: bool,
        fragment: Vec<u8>,
    },
    Unknown {
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: Vec<u8>,
    },
}

impl Frame {
    /// トレース用のフレーム名
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data { .. } => "DATA",
            Self::Headers { .. } => "HEADERS",
            Self::Priority { .. } => "PRIORITY",
            Self::RstStream { .. } => "RST_STREAM",
            Self::Settings { .. } => "SETTINGS",
            Self::PushPromise { .. } => "PUSH_PROMISE",
            Self::Ping { .. } => "PING",
            Self::GoAway { .. } => "GOAWAY",
            Self::WindowUpdate { .. } => "WINDOW_UPDATE",
            Self::Continuation { .. } => "CONTINUATION",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    /// フレームが属するストリーム ID（コネクションフレームは 0）
    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Data { stream_id, .. }
            | Self::Headers { stream_id, .. }
            | Self::Priority { stream_id }
            | Self::RstStream { stream_id, .. }
            | Self::PushPromise { stream_id }
            | Self::WindowUpdate { stream_id, .. }
            | Self::Continuation { stream_id, .. }
            | Self::Unknown { stream_id, .. } => *stream_id,
            Self::Settings { .. } | Self::Ping { .. } | Self::GoAway { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader {
            length: 0x01_02_03,
            frame_type: FrameType::Headers as u8,
            flags: flags::END_HEADERS | flags::END_STREAM,
            stream_id: 1,
        };
        let encoded = header.encode();
        assert_eq!(encoded[0..3], [0x01, 0x02, 0x03]);
        assert_eq!(FrameHeader::decode(&encoded), header);
    }

    #[test]
    fn test_reserved_bit_masked() {
        let mut raw = FrameHeader {
            length: 0,
            frame_type: 0,
            flags: 0,
            stream_id: 5,
        }
        .encode();
        // 予約ビットを立ててもデコード結果は変わらない
        raw[5] |= 0x80;
        assert_eq!(FrameHeader::decode(&raw).stream_id, 5);
    }

    #[test]
    fn test_frame_type_from_u8() {
        assert_eq!(FrameType::from_u8(0x4), Some(FrameType::Settings));
        assert_eq!(FrameType::from_u8(0x9), Some(FrameType::Continuation));
        assert_eq!(FrameType::from_u8(0xee), None);
    }

    #[test]
    fn test_flag_query() {
        let header = FrameHeader {
            length: 0,
            frame_type: FrameType::Headers as u8,
            flags: flags::END_HEADERS,
            stream_id: 3,
        };
        assert!(header.has_flag(flags::END_HEADERS));
        assert!(!header.has_flag(flags::END_STREAM));
    }
}
