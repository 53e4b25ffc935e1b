//! # QPACK デコーダ (RFC 9204 Section 4.5)
//!
//! コネクションごとに 1 インスタンス。動的テーブル容量 0 を広告する
//! ため、受理するのは静的テーブル参照とリテラルのみです。

use super::table::static_entry;
use super::{decode_integer, QpackError, QpackResult};
use crate::http2::hpack::huffman;

/// QPACK デコーダ
#[derive(Default)]
pub struct QpackDecoder;

impl QpackDecoder {
    pub fn new() -> Self {
        Self
    }

    /// フィールドセクション全体を (名前, 値) のリストへデコード
    pub fn decode_field_section(&mut self, block: &[u8]) -> QpackResult<Vec<(Vec<u8>, Vec<u8>)>> {
        // Encoded Field Section Prefix (Section 4.5.1)
        let (required_insert_count, mut pos) = decode_integer(block, 8)?;
        if required_insert_count != 0 {
            // 動的テーブル容量 0 ではゼロ以外になり得ない
            return Err(QpackError::InvalidIndex(required_insert_count));
        }
        let (_delta_base, base_len) = decode_integer(&block[pos..], 7)?;
        pos += base_len;

        let mut fields = Vec::new();
        while pos < block.len() {
            let first = block[pos];

            if first & 0x80 != 0 {
                // Indexed Field Line (Section 4.5.2): 1 T xxxxxx
                if first & 0x40 == 0 {
                    return Err(QpackError::InvalidIndex(0));
                }
                let (index, consumed) = decode_integer(&block[pos..], 6)?;
                pos += consumed;
                let (name, value) =
                    static_entry(index).ok_or(QpackError::InvalidIndex(index))?;
                fields.push((name.to_vec(), value.to_vec()));
            } else if first & 0x40 != 0 {
                // Literal Field Line With Name Reference (Section 4.5.4): 01 N T xxxx
                if first & 0x10 == 0 {
                    return Err(QpackError::InvalidIndex(0));
                }
                let (index, consumed) = decode_integer(&block[pos..], 4)?;
                pos += consumed;
                let (name, _) = static_entry(index).ok_or(QpackError::InvalidIndex(index))?;
                let (value, consumed) = decode_string(&block[pos..], 0x80, 7)?;
                pos += consumed;
                fields.push((name.to_vec(), value));
            } else if first & 0x20 != 0 {
                // Literal Field Line With Literal Name (Section 4.5.6): 001 N H xxx
                let (name, consumed) = decode_string(&block[pos..], 0x08, 3)?;
                pos += consumed;
                let (value, consumed) = decode_string(&block[pos..], 0x80, 7)?;
                pos += consumed;
                fields.push((name, value));
            } else {
                // 0001 / 0000: ポストベース参照 (Section 4.5.3, 4.5.5)
                return Err(QpackError::PostBaseReference);
            }
        }

        Ok(fields)
    }
}

/// 文字列リテラルのデコード (RFC 9204 Section 4.1.2)
///
/// `h_mask` が Huffman ビットの位置、`prefix_bits` が長さプレフィックス。
fn decode_string(buf: &[u8], h_mask: u8, prefix_bits: u8) -> QpackResult<(Vec<u8>, usize)> {
    if buf.is_empty() {
        return Err(QpackError::UnexpectedEnd);
    }
    let huffman_coded = buf[0] & h_mask != 0;
    let (length, prefix_len) = decode_integer(buf, prefix_bits)?;

    let end = prefix_len
        .checked_add(length)
        .ok_or(QpackError::IntegerOverflow)?;
    if buf.len() < end {
        return Err(QpackError::UnexpectedEnd);
    }
    let raw = &buf[prefix_len..end];

    let data = if huffman_coded {
        huffman::decode(raw).map_err(|_| QpackError::Huffman)?
    } else {
        raw.to_vec()
    };
    Ok((data, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_static_fields() {
        // prefix (RIC=0, Base=0)、:method GET (17)、:path / (1)
        let block = [0x00, 0x00, 0xc0 | 17, 0xc0 | 1];
        let fields = QpackDecoder::new().decode_field_section(&block).unwrap();
        assert_eq!(
            fields,
            vec![
                (b":method".to_vec(), b"GET".to_vec()),
                (b":path".to_vec(), b"/".to_vec()),
            ]
        );
    }

    #[test]
    fn test_literal_with_name_reference() {
        // :path (名前 index 1) に値 "/index.html"
        let mut block = vec![0x00, 0x00, 0x50 | 1];
        block.push(11);
        block.extend_from_slice(b"/index.html");
        let fields = QpackDecoder::new().decode_field_section(&block).unwrap();
        assert_eq!(fields, vec![(b":path".to_vec(), b"/index.html".to_vec())]);
    }

    #[test]
    fn test_literal_with_literal_name_huffman() {
        // RFC 7541 C.6.1 の Huffman 値を流用: custom-key / custom-value
        let mut block = vec![0x00, 0x00];
        // 001 N=0 H=1、名前長 8 (3 ビットプレフィックスなので 0x2f 0x01)
        block.extend_from_slice(&[0x2f, 0x01]);
        block.extend_from_slice(&[0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f]);
        block.push(0x80 | 9);
        block.extend_from_slice(&[0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf]);
        let fields = QpackDecoder::new().decode_field_section(&block).unwrap();
        assert_eq!(
            fields,
            vec![(b"custom-key".to_vec(), b"custom-value".to_vec())]
        );
    }

    #[test]
    fn test_dynamic_reference_rejected() {
        // T=0 の Indexed Field Line
        let block = [0x00, 0x00, 0x80 | 0x01];
        assert_eq!(
            QpackDecoder::new().decode_field_section(&block),
            Err(QpackError::InvalidIndex(0))
        );
    }

    #[test]
    fn test_post_base_rejected() {
        let block = [0x00, 0x00, 0x10];
        assert_eq!(
            QpackDecoder::new().decode_field_section(&block),
            Err(QpackError::PostBaseReference)
        );
    }

    #[test]
    fn test_nonzero_required_insert_count_rejected() {
        let block = [0x05, 0x00, 0xc0 | 17];
        assert_eq!(
            QpackDecoder::new().decode_field_section(&block),
            Err(QpackError::InvalidIndex(5))
        );
    }

    #[test]
    fn test_truncated_section() {
        // 値の長さ 11 を宣言してデータ不足
        let block = [0x00, 0x00, 0x50 | 1, 11, b'/'];
        assert_eq!(
            QpackDecoder::new().decode_field_section(&block),
            Err(QpackError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_out_of_range_static_index() {
        let mut block = vec![0x00, 0x00];
        // index 99 は範囲外 (6 ビットプレフィックス: 0xff, 36)
        block.extend_from_slice(&[0xff, 99 - 63]);
        assert_eq!(
            QpackDecoder::new().decode_field_section(&block),
            Err(QpackError::InvalidIndex(99))
        );
    }
}
