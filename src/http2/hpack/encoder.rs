//! # HPACK エンコーダ (RFC 7541 Section 6)
//!
//! レスポンスヘッダーは少数かつ定型なので、静的テーブル一致と
//! インデックス化しないリテラルのみを使います。動的テーブルへの
//! 追加は行いません（相手側の状態を増やさない）。

use super::table::{static_find_exact, static_find_name};
use super::encode_integer;

/// HPACK エンコーダ
#[derive(Default)]
pub struct HpackEncoder;

impl HpackEncoder {
    pub fn new() -> Self {
        Self
    }

    /// ヘッダーリストをヘッダーブロックへエンコード
    pub fn encode(&mut self, fields: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut block = Vec::with_capacity(fields.len() * 32);

        for &(name, value) in fields {
            if let Some(index) = static_find_exact(name, value) {
                // Indexed Header Field: 1xxxxxxx
                encode_integer(&mut block, index, 7, 0x80);
            } else if let Some(index) = static_find_name(name) {
                // Literal without Indexing, 名前は静的参照: 0000xxxx
                encode_integer(&mut block, index, 4, 0x00);
                encode_string(&mut block, value);
            } else {
                // Literal without Indexing, 名前もリテラル
                block.push(0x00);
                encode_string(&mut block, name);
                encode_string(&mut block, value);
            }
        }

        block
    }
}

/// Huffman なしの文字列リテラル (RFC 7541 Section 5.2)
fn encode_string(block: &mut Vec<u8>, data: &[u8]) {
    encode_integer(block, data.len(), 7, 0x00);
    block.extend_from_slice(data);
}
