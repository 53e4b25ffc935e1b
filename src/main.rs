//! # polyserve
//!
//! HTTP/1.1 / HTTP/2 / HTTP/3 の静的ファイルサーバー。
//! モードごとに独立したリスナーを持ちます。
//!
//! - `http1`: 平文 TCP (RFC 7230)
//! - `http2`: TLS + ALPN (RFC 7540)、`http/1.1` フォールバック付き
//! - `http3`: QUIC/UDP (RFC 9114)
//!
//! 使い方: `polyserve <http1|http2|http3> [config.toml]`

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ftlog::{error, info, warn};
use mimalloc::MiMalloc;
use monoio::net::{ListenerConfig, TcpListener, TcpStream};
use monoio::time::timeout;
use monoio_rustls::TlsAcceptor;

mod config;
mod content;
mod http1;
mod http2;
mod http3;
mod protocol;
mod request;
mod tls;
mod trace;
mod transport;

use config::Config;
use content::ContentStore;
use http2::Http2Connection;
use protocol::{classify_initial, NegotiatedProtocol, ALPN_H2_WITH_FALLBACK};
use trace::TraceSink;
use transport::{PrefixedTransport, Transport};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// シャットダウン要求フラグ（シグナルハンドラが立てる）
pub static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    let _guard = ftlog::Builder::new().try_init().unwrap();

    tls::install_crypto_provider();
    setup_signal_handler();

    let args: Vec<String> = std::env::args().collect();
    // モード引数は必須。欠落・不正は usage を出して異常終了する。
    let mode = match parse_mode(args.get(1).map(String::as_str)) {
        Some(mode) => mode,
        None => {
            eprintln!("usage: polyserve <http1|http2|http3> [config.toml]");
            return ExitCode::FAILURE;
        }
    };
    let config_path = args.get(2).map(String::as_str).unwrap_or("config.toml");

    let config = match config::load_config(Path::new(config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config {:?}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    info!("polyserve starting ({} mode)", mode);

    let result = match mode {
        "http1" => run_http1_server(&config),
        "http2" => run_http2_server(&config),
        _ => run_http3_server(&config),
    };

    match result {
        Ok(()) => {
            info!("polyserve stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// モード引数の検証。既知のモード以外は `None`。
fn parse_mode(arg: Option<&str>) -> Option<&str> {
    match arg {
        Some(mode @ ("http1" | "http2" | "http3")) => Some(mode),
        _ => None,
    }
}

/// Ctrl-C でシャットダウンフラグを立てる
///
/// 各アクセプトループは 1 秒周期でフラグを確認して抜けます。
fn setup_signal_handler() {
    let result = ctrlc::set_handler(|| {
        SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
    });
    if let Err(e) = result {
        warn!("failed to install signal handler: {}", e);
    }
}

fn parse_addr(text: &str) -> io::Result<SocketAddr> {
    text.parse().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid listen address {:?}: {}", text, e),
        )
    })
}

fn worker_count(config: &Config) -> usize {
    if config.server.workers == 0 {
        num_cpus::get()
    } else {
        config.server.workers
    }
}

/// SO_REUSEPORT でワーカーごとにリスナーを作る
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener_config = ListenerConfig::default().reuse_port(true).backlog(8192);
    TcpListener::bind_with_config(addr, &listener_config)
}

/// HTTP/1.1 平文サーバー
///
/// ワーカースレッドごとに io_uring ランタイムとリスナーを持つ
/// thread-per-core 構成です。
fn run_http1_server(config: &Config) -> io::Result<()> {
    let addr = parse_addr(&config.server.http1_listen)?;
    let workers = worker_count(config);
    let content_root = config.server.content_root.clone();
    let trace_frames = config.server.trace_frames;

    info!("HTTP/1.1 server listening on {} ({} workers)", addr, workers);

    let mut handles = Vec::new();
    for worker_id in 0..workers {
        let content_root = content_root.clone();
        handles.push(std::thread::spawn(move || {
            let mut rt = match monoio::RuntimeBuilder::<monoio::IoUringDriver>::new()
                .enable_timer()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("worker {}: runtime build failed: {}", worker_id, e);
                    return;
                }
            };
            rt.block_on(async move {
                let listener = match create_listener(addr) {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!("worker {}: bind failed: {}", worker_id, e);
                        return;
                    }
                };
                let store = ContentStore::new(content_root);
                let trace = if trace_frames {
                    TraceSink::stderr()
                } else {
                    TraceSink::disabled()
                };
                http1_accept_loop(listener, store, trace).await;
            });
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

async fn http1_accept_loop(listener: TcpListener, store: ContentStore, trace: TraceSink) {
    loop {
        if SHUTDOWN_FLAG.load(Ordering::Relaxed) {
            return;
        }
        match timeout(Duration::from_secs(1), listener.accept()).await {
            Ok(Ok((stream, _peer))) => {
                let _ = stream.set_nodelay(true);
                let store = store.clone();
                let trace = trace.clone();
                monoio::spawn(async move {
                    if let Err(e) = http1::serve(stream, &store, &trace).await {
                        warn!("HTTP/1.1 connection error: {}", e);
                    }
                });
            }
            Ok(Err(e)) => warn!("accept error: {}", e),
            // タイムアウト。シャットダウンフラグの確認に戻る。
            Err(_) => {}
        }
    }
}

/// HTTP/2 over TLS サーバー
///
/// ALPN で `h2` を優先提示し、`http/1.1` へのフォールバックを許容
/// します。復号後の先頭バイト（HTTP/2 プリフェース）でハンドラを
/// 確定させます。
fn run_http2_server(config: &Config) -> io::Result<()> {
    let tls_section = config.tls.as_ref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "http2 mode requires [tls] cert / key in config",
        )
    })?;
    let server_config = tls::load_server_config(
        Path::new(&tls_section.cert),
        Path::new(&tls_section.key),
        ALPN_H2_WITH_FALLBACK,
    )?;

    let addr = parse_addr(&config.server.http2_listen)?;
    let workers = worker_count(config);
    let content_root = config.server.content_root.clone();
    let trace_frames = config.server.trace_frames;

    info!("HTTP/2 server listening on {} (TLS, {} workers)", addr, workers);

    let mut handles = Vec::new();
    for worker_id in 0..workers {
        let content_root = content_root.clone();
        let server_config = server_config.clone();
        handles.push(std::thread::spawn(move || {
            let mut rt = match monoio::RuntimeBuilder::<monoio::IoUringDriver>::new()
                .enable_timer()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("worker {}: runtime build failed: {}", worker_id, e);
                    return;
                }
            };
            rt.block_on(async move {
                let listener = match create_listener(addr) {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!("worker {}: bind failed: {}", worker_id, e);
                        return;
                    }
                };
                let acceptor = TlsAcceptor::from(server_config);
                let store = ContentStore::new(content_root);
                let trace = if trace_frames {
                    TraceSink::stderr()
                } else {
                    TraceSink::disabled()
                };
                http2_accept_loop(listener, acceptor, store, trace).await;
            });
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

async fn http2_accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    store: ContentStore,
    trace: TraceSink,
) {
    loop {
        if SHUTDOWN_FLAG.load(Ordering::Relaxed) {
            return;
        }
        match timeout(Duration::from_secs(1), listener.accept()).await {
            Ok(Ok((stream, _peer))) => {
                let acceptor = acceptor.clone();
                let store = store.clone();
                let trace = trace.clone();
                monoio::spawn(async move {
                    handle_tls_connection(stream, acceptor, store, trace).await;
                });
            }
            Ok(Err(e)) => warn!("accept error: {}", e),
            Err(_) => {}
        }
    }
}

/// TLS ハンドシェイク後にプロトコルを確定して処理を引き渡す
async fn handle_tls_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    store: ContentStore,
    trace: TraceSink,
) {
    let _ = stream.set_nodelay(true);

    let mut tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            warn!("TLS handshake failed: {}", e);
            return;
        }
    };

    // h2 クライアントは必ずプリフェースから送信を始める (RFC 7540 §3.5)
    let mut initial: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; 1024];
    let negotiated = loop {
        match classify_initial(&initial) {
            NegotiatedProtocol::Undecided => {}
            decided => break decided,
        }
        let (res, buf) = tls_stream.read_buf(chunk).await;
        chunk = buf;
        match res {
            Ok(0) => return,
            Ok(n) => initial.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!("initial read failed: {}", e);
                return;
            }
        }
    };

    // 判定に使ったバイトをストリームの先頭へ差し戻す
    let transport = PrefixedTransport::new(initial, tls_stream);

    match negotiated {
        NegotiatedProtocol::Http2 => {
            let mut conn = Http2Connection::new(transport, store, trace);
            if let Err(e) = conn.serve().await {
                warn!("HTTP/2 connection error: {}", e);
            }
        }
        NegotiatedProtocol::Http1_1 => {
            if let Err(e) = http1::serve(transport, &store, &trace).await {
                warn!("HTTP/1.1 (fallback) connection error: {}", e);
            }
        }
        NegotiatedProtocol::Undecided => {}
    }
}

/// HTTP/3 (QUIC/UDP) サーバー
///
/// quiche は sans-IO のためソケットは単一タスクで駆動します。
fn run_http3_server(config: &Config) -> io::Result<()> {
    let tls_section = config.tls.as_ref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "http3 mode requires [tls] cert / key in config",
        )
    })?;
    let addr = parse_addr(&config.server.http3_listen)?;
    let store = ContentStore::new(config.server.content_root.clone());
    let trace_frames = config.server.trace_frames;

    let mut rt = monoio::RuntimeBuilder::<monoio::IoUringDriver>::new()
        .enable_timer()
        .build()?;

    rt.block_on(async {
        let trace = if trace_frames {
            TraceSink::stderr()
        } else {
            TraceSink::disabled()
        };
        http3::server::run(
            addr,
            Path::new(&tls_section.cert),
            Path::new(&tls_section.key),
            store,
            trace,
        )
        .await
    })
}
