//! # リクエストモデル
//!
//! 3 つのプロトコルバージョンで共通のリクエスト表現と、
//! パス正規化・Content-Type 決定ポリシーを提供します。

use std::fmt;

/// HTTP プロトコルバージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// HTTP/1.1 (平文)
    Http1_1,
    /// HTTP/2 (TLS + ALPN)
    Http2,
    /// HTTP/3 (QUIC)
    Http3,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Http1_1 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
            Self::Http3 => "HTTP/3",
        };
        write!(f, "{}", name)
    }
}

/// 組み立て済みリクエスト
///
/// ヘッダーブロックのデコード結果から構築されます。
/// `path` は正規化済み（コンテンツルートからの相対パス）。
#[derive(Debug, Clone)]
pub struct Request {
    /// プロトコルバージョン
    pub protocol: Protocol,
    /// メソッド (`:method`、無ければ GET)
    pub method: String,
    /// 正規化済みパス（空文字列の場合あり）
    pub path: String,
    /// 擬似ヘッダーを除くヘッダー（名前は小文字化済み）
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// デコード済みヘッダーフィールドからリクエストを構築
    ///
    /// `:path` は正規化され、通常ヘッダーの名前は小文字化されます。
    pub fn from_fields(protocol: Protocol, fields: &[(Vec<u8>, Vec<u8>)]) -> Self {
        let mut method = String::from("GET");
        let mut path = String::new();
        let mut headers = Vec::with_capacity(fields.len());

        for (name, value) in fields {
            let name_str = String::from_utf8_lossy(name);
            let value_str = String::from_utf8_lossy(value).into_owned();
            match name_str.as_ref() {
                ":method" => {
                    if !value_str.is_empty() {
                        method = value_str;
                    }
                }
                ":path" => path = normalize_path(&value_str),
                n if n.starts_with(':') => {}
                n => headers.push((n.to_ascii_lowercase(), value_str)),
            }
        }

        Self { protocol, method, path, headers }
    }
}

/// リクエストパスをコンテンツルート相対パスに正規化
///
/// `/` で終わるパスには `index.html` を補い、前後の `/` を取り除きます。
/// `"/"` → `"index.html"`、`"/foo/"` → `"foo/index.html"`。
/// 結果が空になることもあり、その場合の応答は呼び出し側の分岐が決めます。
pub fn normalize_path(raw: &str) -> String {
    let mut path = raw.to_string();
    if path.ends_with('/') {
        path.push_str("index.html");
    }
    path.trim_matches('/').to_string()
}

/// パスから Content-Type を決定
///
/// 最終セグメントの拡張子 ext に対して `text/<ext>` を返します。
/// 拡張子が無い場合はサブタイプ空の `text/` になります。
pub fn content_type_for(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = match file_name.rfind('.') {
        Some(pos) => &file_name[pos + 1..],
        None => "",
    };
    format!("text/{}", ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_path("/"), "index.html");
    }

    #[test]
    fn test_normalize_directory() {
        assert_eq!(normalize_path("/docs/"), "docs/index.html");
    }

    #[test]
    fn test_normalize_file() {
        assert_eq!(normalize_path("/style.css"), "style.css");
        assert_eq!(normalize_path("/a/b/page.html"), "a/b/page.html");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_content_type_with_extension() {
        assert_eq!(content_type_for("index.html"), "text/html");
        assert_eq!(content_type_for("docs/style.css"), "text/css");
    }

    #[test]
    fn test_content_type_without_extension() {
        assert_eq!(content_type_for("README"), "text/");
    }

    #[test]
    fn test_content_type_dotted_directory() {
        // 拡張子は最終セグメントからのみ取る
        assert_eq!(content_type_for("v1.2/data"), "text/");
    }

    #[test]
    fn test_request_from_fields() {
        let fields = vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":path".to_vec(), b"/index.html".to_vec()),
            (b":scheme".to_vec(), b"https".to_vec()),
            (b"User-Agent".to_vec(), b"test".to_vec()),
        ];
        let req = Request::from_fields(Protocol::Http2, &fields);
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "index.html");
        // 擬似ヘッダーは headers に含めない
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.headers[0].0, "user-agent");
    }

    #[test]
    fn test_request_defaults_to_get() {
        let fields = vec![(b":path".to_vec(), b"/".to_vec())];
        let req = Request::from_fields(Protocol::Http3, &fields);
        assert_eq!(req.method, "GET");
    }
}
