//! # HTTP/3 サーバー (monoio + quiche)
//!
//! monoio の UdpSocket で QUIC パケットを受け、quiche の sans-IO
//! コネクションを駆動します。受信はコネクション全体の最小タイムアウト
//! 付きで行い、タイムアウト時も再送・ACK のための送信処理を回します。

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ftlog::{error, info, warn};
use monoio::net::udp::UdpSocket;
use quiche::ConnectionId;
use ring::rand::{SecureRandom, SystemRandom};

use crate::content::ContentStore;
use crate::http3::connection::Http3Connection;
use crate::protocol::ALPN_H3;
use crate::trace::TraceSink;
use crate::SHUTDOWN_FLAG;

/// UDP データグラムの最大サイズ
const MAX_DATAGRAM_SIZE: usize = 1350;

/// 受信バッファサイズ
const RECV_BUF_SIZE: usize = 65_536;

/// アイドルタイムアウト（ミリ秒）
const MAX_IDLE_TIMEOUT_MS: u64 = 30_000;

type ConnectionMap = Rc<RefCell<HashMap<ConnectionId<'static>, Http3Connection>>>;

fn quic_io_err(e: quiche::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("QUIC error: {:?}", e))
}

/// quiche の QUIC 設定を構築
fn build_quic_config(cert_path: &Path, key_path: &Path) -> io::Result<quiche::Config> {
    let mut config = quiche::Config::new(quiche::PROTOCOL_VERSION).map_err(quic_io_err)?;

    config
        .load_cert_chain_from_pem_file(&cert_path.to_string_lossy())
        .map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("cert load error: {}", e))
        })?;
    config
        .load_priv_key_from_pem_file(&key_path.to_string_lossy())
        .map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("key load error: {}", e))
        })?;

    config.set_application_protos(ALPN_H3).map_err(quic_io_err)?;
    config.set_max_idle_timeout(MAX_IDLE_TIMEOUT_MS);
    config.set_max_recv_udp_payload_size(MAX_DATAGRAM_SIZE);
    config.set_max_send_udp_payload_size(MAX_DATAGRAM_SIZE);
    config.set_initial_max_data(10_000_000);
    config.set_initial_max_stream_data_bidi_local(1_000_000);
    config.set_initial_max_stream_data_bidi_remote(1_000_000);
    config.set_initial_max_stream_data_uni(1_000_000);
    config.set_initial_max_streams_bidi(100);
    config.set_initial_max_streams_uni(100);
    config.set_disable_active_migration(true);

    Ok(config)
}

/// HTTP/3 サーバーを起動（monoio ランタイム上で実行）
pub async fn run(
    bind_addr: SocketAddr,
    cert_path: &Path,
    key_path: &Path,
    store: ContentStore,
    trace: TraceSink,
) -> io::Result<()> {
    let mut quic_config = build_quic_config(cert_path, key_path)?;

    let socket = Rc::new(UdpSocket::bind(bind_addr)?);
    let local_addr = socket.local_addr()?;
    info!("HTTP/3 server listening on {} (QUIC/UDP)", local_addr);

    let connections: ConnectionMap = Rc::new(RefCell::new(HashMap::new()));
    let rng = SystemRandom::new();

    loop {
        if SHUTDOWN_FLAG.load(Ordering::Relaxed) {
            info!("HTTP/3 server shutting down");
            return Ok(());
        }

        // 最小タイムアウトで受信待ち
        let timeout_duration = {
            let conns = connections.borrow();
            conns
                .values()
                .filter_map(|h| h.conn.timeout())
                .min()
                .unwrap_or(Duration::from_millis(100))
        };

        let recv_buf = vec![0u8; RECV_BUF_SIZE];
        let recv_result =
            monoio::time::timeout(timeout_duration, socket.recv_from(recv_buf)).await;

        // タイムアウトしたコネクションの整理
        {
            let mut conns = connections.borrow_mut();
            let mut closed = Vec::new();
            for (cid, handler) in conns.iter_mut() {
                handler.conn.on_timeout();
                if handler.conn.is_closed() {
                    closed.push(cid.clone());
                }
            }
            for cid in closed {
                info!("HTTP/3 connection closed (timeout)");
                conns.remove(&cid);
            }
        }

        let received = match recv_result {
            Ok((Ok((len, from)), buf)) => Some((buf, len, from)),
            Ok((Err(e), _)) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    error!("recv_from error: {}", e);
                }
                None
            }
            // タイムアウト。送信処理だけ回す。
            Err(_) => None,
        };

        if let Some((recv_buf, len, from)) = received {
            let mut pkt_buf = recv_buf[..len].to_vec();

            let hdr = match quiche::Header::from_slice(&mut pkt_buf, quiche::MAX_CONN_ID_LEN) {
                Ok(v) => v,
                Err(e) => {
                    warn!("invalid QUIC packet header: {}", e);
                    send_pending_packets(&connections, &socket).await;
                    continue;
                }
            };

            let conn_id = {
                let mut conns = connections.borrow_mut();
                if conns.contains_key(&hdr.dcid) {
                    hdr.dcid.into_owned()
                } else {
                    if hdr.ty != quiche::Type::Initial {
                        // 未知コネクション宛の非 Initial パケットは捨てる
                        drop(conns);
                        send_pending_packets(&connections, &socket).await;
                        continue;
                    }

                    let mut scid = [0u8; quiche::MAX_CONN_ID_LEN];
                    rng.fill(&mut scid)
                        .map_err(|_| io::Error::new(io::ErrorKind::Other, "RNG error"))?;
                    let scid = ConnectionId::from_ref(&scid).into_owned();

                    let conn = quiche::accept(&scid, None, local_addr, from, &mut quic_config)
                        .map_err(quic_io_err)?;
                    info!("new HTTP/3 connection from {}", from);

                    let handler = Http3Connection::new(conn, store.clone(), trace.clone());
                    conns.insert(scid.clone(), handler);
                    scid
                }
            };

            {
                let mut conns = connections.borrow_mut();
                if let Some(handler) = conns.get_mut(&conn_id) {
                    let recv_info = quiche::RecvInfo {
                        from,
                        to: local_addr,
                    };
                    if let Err(e) = handler.conn.recv(&mut pkt_buf, recv_info) {
                        warn!("QUIC recv error: {:?}", e);
                    }

                    if let Err(e) = handler.on_established() {
                        warn!("control stream setup failed: {}", e);
                    }
                    if let Err(e) = handler.process_readable() {
                        warn!("stream processing failed: {}", e);
                    }
                }
            }
        }

        // ACK・再送・レスポンスの送信は毎周期で実行
        send_pending_packets(&connections, &socket).await;
    }
}

/// 全コネクションの送信待ちパケットをフラッシュ
async fn send_pending_packets(connections: &ConnectionMap, socket: &Rc<UdpSocket>) {
    let mut conns = connections.borrow_mut();
    let mut send_buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut closed = Vec::new();

    for (cid, handler) in conns.iter_mut() {
        // ストリームのフロー制御が開いた分を先に流し込む
        if let Err(e) = handler.flush_pending() {
            warn!("pending write flush failed: {}", e);
        }

        loop {
            let (write, send_info) = match handler.conn.send(&mut send_buf) {
                Ok(v) => v,
                Err(quiche::Error::Done) => break,
                Err(e) => {
                    error!("QUIC send error: {:?}", e);
                    handler.conn.close(false, 0x1, b"send error").ok();
                    break;
                }
            };

            let (res, _) = socket.send_to(send_buf[..write].to_vec(), send_info.to).await;
            if let Err(e) = res {
                warn!("send_to error: {}", e);
            }
        }

        if handler.conn.is_closed() {
            closed.push(cid.clone());
        }
    }

    for cid in closed {
        info!("HTTP/3 connection closed");
        conns.remove(&cid);
    }
}
