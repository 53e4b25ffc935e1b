//! # HPACK インデックステーブル (RFC 7541 Section 2)
//!
//! インデックス空間は 1..=61 が静的テーブル、62.. が動的テーブル。

use std::collections::VecDeque;

/// 動的テーブルのエントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl TableEntry {
    /// エントリサイズ = 名前長 + 値長 + 32 (RFC 7541 Section 4.1)
    #[inline]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

/// 静的テーブル (RFC 7541 Appendix A、1-indexed)
pub const STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// 静的テーブルで名前と値の完全一致を検索 (1-indexed)
pub fn static_find_exact(name: &[u8], value: &[u8]) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, v)| n == name && v == value)
        .map(|i| i + 1)
}

/// 静的テーブルで名前一致を検索 (1-indexed)
pub fn static_find_name(name: &[u8]) -> Option<usize> {
    STATIC_TABLE.iter().position(|&(n, _)| n == name).map(|i| i + 1)
}

/// FIFO 動的テーブル (RFC 7541 Section 2.3.2)
///
/// 新しいエントリが先頭（最小インデックス）、あふれた分は末尾から
/// 追い出されます。
pub struct DynamicTable {
    entries: VecDeque<TableEntry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 最大サイズの更新 (RFC 7541 Section 4.3)
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    /// エントリ追加 (RFC 7541 Section 4.4)
    pub fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) {
        let entry = TableEntry { name, value };
        let entry_size = entry.size();

        // 単体で上限を超えるエントリはテーブルを空にするだけ
        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }

        while self.size + entry_size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.size();
            } else {
                break;
            }
        }

        self.size += entry_size;
        self.entries.push_front(entry);
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.size();
            } else {
                break;
            }
        }
    }

    /// 統合インデックス空間の解決
    ///
    /// 1..=61 は静的テーブル、62.. は動的テーブル。0 と範囲外は None。
    pub fn resolve(&self, index: usize) -> Option<(&[u8], &[u8])> {
        if index == 0 {
            return None;
        }
        if index <= STATIC_TABLE.len() {
            let (name, value) = STATIC_TABLE[index - 1];
            return Some((name, value));
        }
        self.entries
            .get(index - STATIC_TABLE.len() - 1)
            .map(|e| (e.name.as_slice(), e.value.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_entries() {
        let table = DynamicTable::new(4096);
        assert_eq!(table.resolve(1), Some((b":authority".as_slice(), b"".as_slice())));
        assert_eq!(table.resolve(2), Some((b":method".as_slice(), b"GET".as_slice())));
        assert_eq!(table.resolve(8), Some((b":status".as_slice(), b"200".as_slice())));
        assert_eq!(table.resolve(61), Some((b"www-authenticate".as_slice(), b"".as_slice())));
        assert_eq!(table.resolve(0), None);
        assert_eq!(table.resolve(62), None);
    }

    #[test]
    fn test_static_find() {
        assert_eq!(static_find_exact(b":method", b"GET"), Some(2));
        assert_eq!(static_find_exact(b":method", b"PATCH"), None);
        assert_eq!(static_find_name(b"content-type"), Some(31));
    }

    #[test]
    fn test_dynamic_insert_and_resolve() {
        let mut table = DynamicTable::new(4096);
        table.insert(b"x-first".to_vec(), b"1".to_vec());
        table.insert(b"x-second".to_vec(), b"2".to_vec());
        // 新しいエントリが 62
        assert_eq!(table.resolve(62), Some((b"x-second".as_slice(), b"2".as_slice())));
        assert_eq!(table.resolve(63), Some((b"x-first".as_slice(), b"1".as_slice())));
    }

    #[test]
    fn test_dynamic_eviction() {
        // 1 エントリ 52 バイト、上限 100 → 2 つ目で最古が追い出される
        let mut table = DynamicTable::new(100);
        table.insert(b"header-aaa".to_vec(), b"value-aaaa".to_vec());
        table.insert(b"header-bbb".to_vec(), b"value-bbbb".to_vec());
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(62), Some((b"header-bbb".as_slice(), b"value-bbbb".as_slice())));
    }

    #[test]
    fn test_oversized_entry_clears_table() {
        let mut table = DynamicTable::new(40);
        table.insert(b"a".to_vec(), b"b".to_vec());
        table.insert(b"much-too-long-header-name".to_vec(), b"with a long value".to_vec());
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_set_max_size_evicts() {
        let mut table = DynamicTable::new(200);
        table.insert(b"one".to_vec(), b"1".to_vec());
        table.insert(b"two".to_vec(), b"2".to_vec());
        table.set_max_size(40);
        assert_eq!(table.len(), 1);
    }
}
