//! # コンテンツルート境界
//!
//! 静的ファイル読み込みの唯一の入口。レスポンス側の寛容ポリシー
//! （読み込み失敗 → 空ボディで 200）もここで名前を持ちます。

use std::io;
use std::path::PathBuf;

use ftlog::warn;

/// 静的コンテンツの読み込み境界
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// コンテンツルートを指定してストアを作成
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 正規化済み相対パスのファイルを読み込む
    ///
    /// ルート外参照 (`..` セグメント) はここで拒否され、寛容ポリシー
    /// により空ボディの 200 になります。
    pub fn read(&self, rel_path: &str) -> io::Result<Vec<u8>> {
        if escapes_root(rel_path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "path escapes content root",
            ));
        }
        std::fs::read(self.root.join(rel_path))
    }

    /// 寛容ポリシー: 読み込みに失敗したら空ボディ
    ///
    /// ステータスは常に 200 のまま、ボディだけが空になります。
    /// 失敗は警告ログに残します。
    pub fn read_or_empty(&self, rel_path: &str) -> Vec<u8> {
        match self.read(rel_path) {
            Ok(data) => data,
            Err(e) => {
                warn!("content read failed for {:?}: {}", rel_path, e);
                Vec::new()
            }
        }
    }
}

/// パスに `..` セグメントが含まれるか
fn escapes_root(rel_path: &str) -> bool {
    rel_path.split('/').any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("polyserve-content-{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_read_existing_file() {
        let root = temp_root("read");
        std::fs::write(root.join("hello.html"), b"<p>hi</p>").unwrap();
        let store = ContentStore::new(&root);
        assert_eq!(store.read("hello.html").unwrap(), b"<p>hi</p>");
    }

    #[test]
    fn test_read_rejects_parent_segments() {
        let root = temp_root("traversal");
        let nested = root.join("site");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("outside.txt"), b"outside").unwrap();

        let store = ContentStore::new(&nested);
        assert!(store.read("../outside.txt").is_err());
        assert!(store.read("a/../../outside.txt").is_err());
        assert!(store.read_or_empty("../outside.txt").is_empty());
    }

    #[test]
    fn test_read_allows_dotted_file_names() {
        let root = temp_root("dotted");
        std::fs::write(root.join("app..css"), b"x").unwrap();
        let store = ContentStore::new(&root);
        // `..` を含むファイル名そのものはセグメントではない
        assert_eq!(store.read("app..css").unwrap(), b"x");
    }

    #[test]
    fn test_read_or_empty_missing_file() {
        let store = ContentStore::new(temp_root("missing"));
        assert!(store.read("no-such-file.html").is_err());
        assert!(store.read_or_empty("no-such-file.html").is_empty());
    }
}
