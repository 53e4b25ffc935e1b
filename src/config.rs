//! # 設定ファイル
//!
//! `config.toml` を serde + toml で読み込みます。
//! ファイルが無い場合はデフォルト値で起動します。

use std::io;
use std::path::Path;

use serde::Deserialize;

/// サーバー全体の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub tls: Option<TlsSection>,
}

/// `[server]` セクション
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// HTTP/1.1 平文リスナー
    pub http1_listen: String,
    /// HTTP/2 TLS リスナー
    pub http2_listen: String,
    /// HTTP/3 UDP リスナー
    pub http3_listen: String,
    /// 静的コンテンツルート
    pub content_root: String,
    /// ワーカースレッド数 (0 = CPU コア数)
    pub workers: usize,
    /// フレームトレース出力
    pub trace_frames: bool,
}

/// `[tls]` セクション
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSection {
    /// PEM 形式の証明書チェーン
    pub cert: String,
    /// PEM 形式の秘密鍵
    pub key: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http1_listen: "0.0.0.0:8080".to_string(),
            http2_listen: "0.0.0.0:8443".to_string(),
            http3_listen: "0.0.0.0:8443".to_string(),
            content_root: "public".to_string(),
            workers: 0,
            trace_frames: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            tls: None,
        }
    }
}

/// 設定ファイルを読み込む
///
/// ファイルが存在しない場合はデフォルト設定を返します。
pub fn load_config(path: &Path) -> io::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("config parse error: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.http1_listen, "0.0.0.0:8080");
        assert_eq!(config.server.content_root, "public");
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
            [server]
            http1_listen = "127.0.0.1:9080"
            content_root = "www"
            workers = 2
            trace_frames = false

            [tls]
            cert = "cert.pem"
            key = "key.pem"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.server.http1_listen, "127.0.0.1:9080");
        assert_eq!(config.server.content_root, "www");
        assert_eq!(config.server.workers, 2);
        assert!(!config.server.trace_frames);
        let tls = config.tls.unwrap();
        assert_eq!(tls.cert, "cert.pem");
        assert_eq!(tls.key, "key.pem");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let text = r#"
            [server]
            http2_listen = "0.0.0.0:10443"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.server.http2_listen, "0.0.0.0:10443");
        assert_eq!(config.server.http1_listen, "0.0.0.0:8080");
    }
}
