//! # HTTP/1.1 処理
//!
//! httparse によるリクエスト解析と Keep-Alive ループ。
//! ステータスは常に 200 で、フレーム系プロトコルと同じ
//! パス正規化・Content-Type・寛容読み込みポリシーを共有します。

use std::io;

use httparse::Status;

use crate::content::ContentStore;
use crate::request::{content_type_for, normalize_path, Protocol};
use crate::trace::{Direction, TraceSink};
use crate::transport::Transport;

/// 読み込みチャンクサイズ
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// 蓄積を許すリクエストヘッダーの上限
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// HTTP/1.1 接続を最後まで処理
///
/// Keep-Alive がデフォルト。`Connection: close` か EOF で終了します。
pub async fn serve<T: Transport>(
    mut transport: T,
    store: &ContentStore,
    trace: &TraceSink,
) -> io::Result<()> {
    let mut accumulated: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        // 蓄積済みの完全なリクエストをすべて処理してから次を読む
        loop {
            let mut headers_storage = [httparse::EMPTY_HEADER; 32];
            let mut req = httparse::Request::new(&mut headers_storage);

            let (header_len, raw_path, wants_close) = match req.parse(&accumulated) {
                Ok(Status::Complete(header_len)) => {
                    let raw_path = req.path.unwrap_or("/").to_string();
                    let wants_close = req
                        .headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case("connection"))
                        .map(|h| h.value.eq_ignore_ascii_case(b"close"))
                        .unwrap_or(false);
                    (header_len, raw_path, wants_close)
                }
                // ヘッダー未完、続きを待つ
                Ok(Status::Partial) => break,
                Err(_) => return Ok(()),
            };

            trace.frame(
                Direction::Recv,
                Protocol::Http1_1,
                0,
                &format!("request path={}", raw_path),
            );

            let path = normalize_path(&raw_path);
            let body = if path.is_empty() {
                Vec::new()
            } else {
                store.read_or_empty(&path)
            };
            let response = build_response(&path, &body, wants_close);

            trace.frame(
                Direction::Send,
                Protocol::Http1_1,
                0,
                &format!("response len={}", body.len()),
            );
            let (res, _) = transport.write_all_buf(response).await;
            res?;

            if wants_close {
                return Ok(());
            }
            accumulated.drain(..header_len);
        }

        if accumulated.len() > MAX_HEADER_SIZE {
            return Ok(());
        }

        let (res, returned) = transport.read_buf(chunk).await;
        chunk = returned;
        let n = res?;
        if n == 0 {
            return Ok(());
        }
        accumulated.extend_from_slice(&chunk[..n]);
    }
}

/// レスポンスバイト列を構築（常にステータス 200）
fn build_response(path: &str, body: &[u8], close: bool) -> Vec<u8> {
    let content_type = content_type_for(path);
    let mut num_buf = itoa::Buffer::new();
    let content_length = num_buf.format(body.len());

    let mut response = Vec::with_capacity(128 + body.len());
    response.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Type: ");
    response.extend_from_slice(content_type.as_bytes());
    response.extend_from_slice(b"\r\nContent-Length: ");
    response.extend_from_slice(content_length.as_bytes());
    if close {
        response.extend_from_slice(b"\r\nConnection: close\r\n\r\n");
    } else {
        response.extend_from_slice(b"\r\nConnection: keep-alive\r\n\r\n");
    }
    response.extend_from_slice(body);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn temp_store(name: &str, files: &[(&str, &[u8])]) -> ContentStore {
        let dir = std::env::temp_dir().join(format!("polyserve-h1-{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        for (file, data) in files {
            std::fs::write(dir.join(file), data).unwrap();
        }
        ContentStore::new(dir)
    }

    async fn run(input: &[u8], store: &ContentStore) -> Vec<u8> {
        let mut transport = MemoryTransport::new(input.to_vec());
        serve(&mut transport, store, &TraceSink::disabled())
            .await
            .unwrap();
        transport.output
    }

    #[monoio::test]
    async fn test_serves_file_with_status_200() {
        let store = temp_store("basic", &[("index.html", b"<h1>hi</h1>")]);
        let output = run(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n", &store).await;
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("<h1>hi</h1>"));
    }

    #[monoio::test]
    async fn test_directory_path_serves_index() {
        let store = temp_store("dir", &[("index.html", b"root")]);
        let output = run(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", &store).await;
        let text = String::from_utf8(output).unwrap();
        assert!(text.ends_with("root"));
    }

    #[monoio::test]
    async fn test_missing_file_still_200_empty_body() {
        let store = temp_store("missing", &[]);
        let output = run(b"GET /nope.css HTTP/1.1\r\nHost: x\r\n\r\n", &store).await;
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/css\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[monoio::test]
    async fn test_keep_alive_serves_two_requests() {
        let store = temp_store("keepalive", &[("a.html", b"A"), ("b.html", b"B")]);
        let input = b"GET /a.html HTTP/1.1\r\nHost: x\r\n\r\nGET /b.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        let output = run(input, &store).await;
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(text.contains("Connection: keep-alive"));
        assert!(text.contains("Connection: close"));
    }
}
