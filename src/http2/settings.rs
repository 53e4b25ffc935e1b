//! # HTTP/2 SETTINGS (RFC 7540 Section 6.5)

/// SETTINGS 識別子
pub mod identifier {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// デフォルトの最大フレームサイズ (RFC 7540 Section 4.2)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// サーバーが広告する設定
#[derive(Debug, Clone)]
pub struct Http2Settings {
    /// 最大同時ストリーム数
    pub max_concurrent_streams: u32,
    /// 最大フレームサイズ
    pub max_frame_size: u32,
    /// サーバープッシュ無効
    pub enable_push: bool,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            enable_push: false,
        }
    }
}

impl Http2Settings {
    /// SETTINGS フレームに載せるエントリ列
    pub fn to_entries(&self) -> Vec<(u16, u32)> {
        vec![
            (identifier::ENABLE_PUSH, u32::from(self.enable_push)),
            (identifier::MAX_CONCURRENT_STREAMS, self.max_concurrent_streams),
            (identifier::MAX_FRAME_SIZE, self.max_frame_size),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entries() {
        let entries = Http2Settings::default().to_entries();
        assert!(entries.contains(&(identifier::ENABLE_PUSH, 0)));
        assert!(entries.contains(&(identifier::MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE)));
    }
}
