//! # HPACK デコーダ (RFC 7541 Section 6)
//!
//! コネクションごとに 1 インスタンス。動的テーブルはブロックを
//! またいで共有されるため、同一接続のヘッダーブロックは受信順に
//! このデコーダへ渡す必要があります。

use super::table::DynamicTable;
use super::{decode_integer, huffman, HpackError, HpackResult};

/// デフォルトの動的テーブルサイズ (RFC 7541 Section 6.5.2)
const DEFAULT_TABLE_SIZE: usize = 4096;

/// HPACK デコーダ
pub struct HpackDecoder {
    table: DynamicTable,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

impl HpackDecoder {
    pub fn new(max_table_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_size),
        }
    }

    /// ヘッダーブロック全体を (名前, 値) のリストへデコード
    pub fn decode(&mut self, block: &[u8]) -> HpackResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut fields = Vec::new();
        let mut pos = 0;

        while pos < block.len() {
            let first = block[pos];

            if first & 0x80 != 0 {
                // Indexed Header Field (Section 6.1)
                let (index, consumed) = decode_integer(&block[pos..], 7)?;
                pos += consumed;
                let (name, value) = self
                    .table
                    .resolve(index)
                    .ok_or(HpackError::InvalidIndex(index))?;
                fields.push((name.to_vec(), value.to_vec()));
            } else if first & 0x40 != 0 {
                // Literal with Incremental Indexing (Section 6.2.1)
                let (name, value, consumed) = self.decode_literal(&block[pos..], 6)?;
                pos += consumed;
                self.table.insert(name.clone(), value.clone());
                fields.push((name, value));
            } else if first & 0x20 != 0 {
                // Dynamic Table Size Update (Section 6.3)
                let (size, consumed) = decode_integer(&block[pos..], 5)?;
                pos += consumed;
                self.table.set_max_size(size);
            } else {
                // Literal without Indexing / Never Indexed (Section 6.2.2, 6.2.3)
                let (name, value, consumed) = self.decode_literal(&block[pos..], 4)?;
                pos += consumed;
                fields.push((name, value));
            }
        }

        Ok(fields)
    }

    /// リテラル表現のデコード（名前参照または名前リテラル + 値）
    fn decode_literal(
        &self,
        buf: &[u8],
        prefix_bits: u8,
    ) -> HpackResult<(Vec<u8>, Vec<u8>, usize)> {
        let (name_index, mut pos) = decode_integer(buf, prefix_bits)?;

        let name = if name_index == 0 {
            let (name, consumed) = decode_string(&buf[pos..])?;
            pos += consumed;
            name
        } else {
            self.table
                .resolve(name_index)
                .ok_or(HpackError::InvalidIndex(name_index))?
                .0
                .to_vec()
        };

        let (value, consumed) = decode_string(&buf[pos..])?;
        pos += consumed;

        Ok((name, value, pos))
    }
}

/// 文字列リテラルのデコード (RFC 7541 Section 5.2)
fn decode_string(buf: &[u8]) -> HpackResult<(Vec<u8>, usize)> {
    if buf.is_empty() {
        return Err(HpackError::UnexpectedEnd);
    }
    let huffman_coded = buf[0] & 0x80 != 0;
    let (length, prefix_len) = decode_integer(buf, 7)?;

    let end = prefix_len
        .checked_add(length)
        .ok_or(HpackError::IntegerOverflow)?;
    if buf.len() < end {
        return Err(HpackError::UnexpectedEnd);
    }
    let raw = &buf[prefix_len..end];

    let data = if huffman_coded {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok((data, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rfc_first_request_plain() {
        // RFC 7541 C.3.1
        let block: Vec<u8> = [
            vec![0x82, 0x86, 0x84, 0x41, 0x0f],
            b"www.example.com".to_vec(),
        ]
        .concat();
        let mut decoder = HpackDecoder::default();
        let fields = decoder.decode(&block).unwrap();
        assert_eq!(
            fields,
            vec![
                (b":method".to_vec(), b"GET".to_vec()),
                (b":scheme".to_vec(), b"http".to_vec()),
                (b":path".to_vec(), b"/".to_vec()),
                (b":authority".to_vec(), b"www.example.com".to_vec()),
            ]
        );
        // インクリメンタルインデックス化で動的テーブルに 1 エントリ
        assert_eq!(decoder.table.len(), 1);
    }

    #[test]
    fn test_decode_rfc_first_request_huffman() {
        // RFC 7541 C.4.1
        let block = [
            0x82, 0x86, 0x84, 0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0,
            0xab, 0x90, 0xf4, 0xff,
        ];
        let mut decoder = HpackDecoder::default();
        let fields = decoder.decode(&block).unwrap();
        assert_eq!(fields[3], (b":authority".to_vec(), b"www.example.com".to_vec()));
    }

    #[test]
    fn test_decode_sequential_requests_share_table() {
        // RFC 7541 C.3.1 → C.3.2: 2 番目のリクエストが動的テーブルを参照
        let mut decoder = HpackDecoder::default();
        let first: Vec<u8> = [
            vec![0x82, 0x86, 0x84, 0x41, 0x0f],
            b"www.example.com".to_vec(),
        ]
        .concat();
        decoder.decode(&first).unwrap();

        let second: Vec<u8> = [
            vec![0x82, 0x86, 0x84, 0xbe, 0x58, 0x08],
            b"no-cache".to_vec(),
        ]
        .concat();
        let fields = decoder.decode(&second).unwrap();
        assert_eq!(fields[3], (b":authority".to_vec(), b"www.example.com".to_vec()));
        assert_eq!(fields[4], (b"cache-control".to_vec(), b"no-cache".to_vec()));
    }

    #[test]
    fn test_literal_never_indexed() {
        // 0001 プレフィックス、名前リテラル "password" / 値 "secret"
        let mut block = vec![0x10];
        block.push(8);
        block.extend_from_slice(b"password");
        block.push(6);
        block.extend_from_slice(b"secret");
        let mut decoder = HpackDecoder::default();
        let fields = decoder.decode(&block).unwrap();
        assert_eq!(fields, vec![(b"password".to_vec(), b"secret".to_vec())]);
        // テーブルには入らない
        assert!(decoder.table.is_empty());
    }

    #[test]
    fn test_invalid_index() {
        let mut decoder = HpackDecoder::default();
        // インデックス 70 はまだ存在しない
        assert_eq!(
            decoder.decode(&[0x80 | 70]),
            Err(HpackError::InvalidIndex(70))
        );
    }

    #[test]
    fn test_truncated_string() {
        let mut decoder = HpackDecoder::default();
        // 名前長 10 を宣言してデータが無い
        assert_eq!(decoder.decode(&[0x00, 0x0a]), Err(HpackError::UnexpectedEnd));
    }

    #[test]
    fn test_table_size_update() {
        let mut decoder = HpackDecoder::default();
        // 001 プレフィックスでサイズ 0 に更新
        decoder.decode(&[0x20]).unwrap();
        // その後の挿入はすべて追い出される
        let block: Vec<u8> = [vec![0x41, 0x03], b"foo".to_vec()].concat();
        decoder.decode(&block).unwrap();
        assert!(decoder.table.is_empty());
    }
}
