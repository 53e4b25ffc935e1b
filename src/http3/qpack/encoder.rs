//! # QPACK エンコーダ (RFC 9204 Section 4.5)
//!
//! 動的テーブルを使わないため、フィールドセクションプレフィックスは
//! 常に Required Insert Count = 0 / Delta Base = 0 です。

use super::table::{static_find_exact, static_find_name};
use super::encode_integer;

/// QPACK エンコーダ
#[derive(Default)]
pub struct QpackEncoder;

impl QpackEncoder {
    pub fn new() -> Self {
        Self
    }

    /// ヘッダーリストをフィールドセクションへエンコード
    pub fn encode_field_section(&mut self, fields: &[(&[u8], &[u8])]) -> Vec<u8> {
        // RIC = 0, Delta Base = 0
        let mut block = vec![0x00, 0x00];

        for &(name, value) in fields {
            if let Some(index) = static_find_exact(name, value) {
                // Indexed Field Line (static): 11xxxxxx
                encode_integer(&mut block, index, 6, 0xc0);
            } else if let Some(index) = static_find_name(name) {
                // Literal With Name Reference (static): 0101xxxx
                encode_integer(&mut block, index, 4, 0x50);
                encode_string(&mut block, value);
            } else {
                // Literal With Literal Name: 001 N=0 H=0
                encode_integer(&mut block, name.len(), 3, 0x20);
                block.extend_from_slice(name);
                encode_string(&mut block, value);
            }
        }

        block
    }
}

/// Huffman なしの値リテラル (RFC 9204 Section 4.1.2)
fn encode_string(block: &mut Vec<u8>, data: &[u8]) {
    encode_integer(block, data.len(), 7, 0x00);
    block.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http3::qpack::QpackDecoder;

    #[test]
    fn test_static_exact_match() {
        let block = QpackEncoder::new().encode_field_section(&[(b":status", b"200")]);
        // プレフィックス 2 バイト + 静的 index 25
        assert_eq!(block, vec![0x00, 0x00, 0xc0 | 25]);
    }

    #[test]
    fn test_response_headers_decode_back() {
        let block = QpackEncoder::new().encode_field_section(&[
            (b":status", b"200"),
            (b"content-type", b"text/html"),
        ]);
        let fields = QpackDecoder::new().decode_field_section(&block).unwrap();
        assert_eq!(
            fields,
            vec![
                (b":status".to_vec(), b"200".to_vec()),
                (b"content-type".to_vec(), b"text/html".to_vec()),
            ]
        );
    }

    #[test]
    fn test_unknown_name_literal() {
        let block = QpackEncoder::new().encode_field_section(&[(b"x-custom", b"v")]);
        let fields = QpackDecoder::new().decode_field_section(&block).unwrap();
        assert_eq!(fields, vec![(b"x-custom".to_vec(), b"v".to_vec())]);
    }
}
