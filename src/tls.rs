//! # TLS 設定
//!
//! rustls の ServerConfig を PEM ファイルから構築します。
//! 暗号プロバイダは ring を使用します（HTTP/3 側は quiche が
//! 同じ PEM パスを直接読み込みます）。

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

/// ring 暗号プロバイダをプロセスのデフォルトとして登録
///
/// 多重登録は他所で登録済みということなので無視します。
pub fn install_crypto_provider() {
    let _ = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::ring::default_provider(),
    );
}

/// PEM の証明書チェーンと秘密鍵から ServerConfig を構築
///
/// ALPN プロトコルリストは呼び出し側（リスナーのモード）が決めます。
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
    alpn: &[&[u8]],
) -> io::Result<Arc<ServerConfig>> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("TLS config error: {}", e)))?;

    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}

/// 証明書チェーンを読み込む
fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("cannot open cert {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates found in {:?}", path),
        ));
    }
    Ok(certs)
}

/// 秘密鍵を読み込む
fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("cannot open key {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {:?}", path),
        )
    })
}
