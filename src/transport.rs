//! # バイトトランスポート境界
//!
//! monoio の所有権渡しバッファ I/O をフレーム層から切り離すための
//! 小さなトレイト。TCP / TLS ストリームとテスト用のインメモリ実装が
//! 同じ接続コードを通ります。

use std::io;

use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;

/// 所有権渡しバッファでの読み書き
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// バッファに読み込み、読めたバイト数とバッファを返す
    async fn read_buf(&mut self, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>);

    /// バッファ全体を書き込む
    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>);
}

impl<T: Transport> Transport for &mut T {
    async fn read_buf(&mut self, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
        (**self).read_buf(buf).await
    }

    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>) {
        (**self).write_all_buf(buf).await
    }
}

impl Transport for TcpStream {
    async fn read_buf(&mut self, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
        AsyncReadRent::read(self, buf).await
    }

    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>) {
        let (res, buf) = AsyncWriteRentExt::write_all(self, buf).await;
        (res.map(|_| ()), buf)
    }
}

impl Transport for monoio_rustls::ServerTlsStream<TcpStream> {
    async fn read_buf(&mut self, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
        AsyncReadRent::read(self, buf).await
    }

    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>) {
        let (res, buf) = AsyncWriteRentExt::write_all(self, buf).await;
        (res.map(|_| ()), buf)
    }
}

/// 先読み済みバイトを先頭に差し戻すトランスポート
///
/// プロトコル判定で読んでしまった先頭バイトを、後続のハンドラに
/// ストリームの一部として見せるために使います。
pub struct PrefixedTransport<T> {
    prefix: Vec<u8>,
    pos: usize,
    inner: T,
}

impl<T> PrefixedTransport<T> {
    pub fn new(prefix: Vec<u8>, inner: T) -> Self {
        Self { prefix, pos: 0, inner }
    }
}

impl<T: Transport> Transport for PrefixedTransport<T> {
    async fn read_buf(&mut self, mut buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
        let remaining = self.prefix.len() - self.pos;
        if remaining > 0 {
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            return (Ok(n), buf);
        }
        self.inner.read_buf(buf).await
    }

    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>) {
        self.inner.write_all_buf(buf).await
    }
}

/// インメモリトランスポート（テスト用）
///
/// `input` を順に読み出し、書き込みは `output` に蓄積します。
/// 入力を使い切ると EOF (Ok(0)) を返します。
#[cfg(test)]
pub struct MemoryTransport {
    input: Vec<u8>,
    pos: usize,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl MemoryTransport {
    pub fn new(input: Vec<u8>) -> Self {
        Self { input, pos: 0, output: Vec::new() }
    }
}

#[cfg(test)]
impl Transport for MemoryTransport {
    async fn read_buf(&mut self, mut buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
        let remaining = self.input.len() - self.pos;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
        self.pos += n;
        (Ok(n), buf)
    }

    async fn write_all_buf(&mut self, buf: Vec<u8>) -> (io::Result<()>, Vec<u8>) {
        self.output.extend_from_slice(&buf);
        (Ok(()), buf)
    }
}
