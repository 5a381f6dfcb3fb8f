//! TLS 受理路径测试
//!
//! - **Why**：TLS 连接要先经过受理队列与握手池，`TryConnect` 与 `Connect` 之间隔着一次有界握手；
//! - **How**：rcgen 生成自签证书，rustls 阻塞客户端完成握手并收发明文；
//! - **What**：握手成功的会话标记为加密并正常回显；握手失败的连接只观察到 `TryConnect`。

mod support;

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpStream,
    sync::Arc,
    time::Duration,
};

use flare_core::{AddressFamily, ServerConfig};
use flare_mux::MuxFlavor;
use flare_server::{NetworkServer, TlsServerSocket};
use flare_tls::{HotTlsConfig, pem};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};

use support::{Recorder, echo_handler, line_protocols, quick_config, wait_until};

struct Identity {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

fn identity() -> Identity {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).expect("生成自签证书");
    Identity {
        cert: certified.cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        )),
    }
}

fn open_tls(
    identity: &Identity,
    config: ServerConfig,
    flavor: MuxFlavor,
    recorder: &Arc<Recorder>,
) -> NetworkServer {
    let tls = pem::server_config(vec![identity.cert.clone()], identity.key.clone_key())
        .expect("服务端配置");
    let server = NetworkServer::builder()
        .config(config)
        .protocols(line_protocols())
        .multiplexer(flavor)
        .open(
            AddressFamily::Loopback,
            0,
            Arc::new(TlsServerSocket::new(HotTlsConfig::from_config(tls))),
            echo_handler(Arc::clone(recorder)),
        )
        .expect("打开服务器");
    server.start().expect("启动工作池");
    server
}

fn tls_client(
    identity: &Identity,
    server: &NetworkServer,
) -> rustls::StreamOwned<rustls::ClientConnection, TcpStream> {
    let config = pem::client_config(std::slice::from_ref(&identity.cert)).expect("客户端配置");
    let name = ServerName::try_from("localhost").expect("服务器名");
    let conn = rustls::ClientConnection::new(Arc::new(config), name).expect("客户端连接");
    let tcp = TcpStream::connect(server.local_addr()).expect("连接服务器");
    tcp.set_read_timeout(Some(Duration::from_secs(5)))
        .expect("设置读超时");
    rustls::StreamOwned::new(conn, tcp)
}

fn assert_tls_echo(flavor: MuxFlavor) {
    let identity = identity();
    let recorder = Recorder::new();
    let server = open_tls(&identity, quick_config(), flavor, &recorder);
    assert_eq!(server.worker_counts().tls, 1, "TLS 传输在打开时启动握手池");

    let mut client = tls_client(&identity, &server);
    client.write_all(b"secret\n").expect("写入明文");
    client.flush().expect("刷新");
    let mut line = String::new();
    BufReader::new(&mut client)
        .read_line(&mut line)
        .expect("读取回显");
    assert_eq!(line, "secret\n");

    let seen = recorder.snapshot();
    let connect = seen
        .iter()
        .find(|s| s.name == "connect")
        .expect("握手完成后派发 Connect");
    assert!(connect.secure, "TLS 会话标记为加密");
    let socket = connect.socket;
    assert_eq!(recorder.count_for("try_connect", socket), 1, "受理时先派发 TryConnect");
    assert_eq!(recorder.count_for("read", socket), 1);

    drop(client);
    assert!(
        wait_until(|| recorder.count_for("disconnect", socket) == 1),
        "对端关闭后应派发 Disconnect"
    );
    server.close();
}

#[test]
fn tls_lines_are_echoed_on_the_readiness_backend() {
    assert_tls_echo(MuxFlavor::Readiness);
}

#[test]
fn tls_lines_are_echoed_on_the_completion_backend() {
    assert_tls_echo(MuxFlavor::Completion);
}

#[test]
fn failed_handshake_never_creates_a_session() {
    let identity = identity();
    let recorder = Recorder::new();
    let mut config = quick_config();
    config.handshake.max_attempts = 4;
    config.handshake.attempt_timeout_ms = 50;
    let server = open_tls(&identity, config, MuxFlavor::Readiness, &recorder);

    let mut client = TcpStream::connect(server.local_addr()).expect("连接服务器");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("设置读超时");
    client
        .write_all(b"GET / HTTP/1.0\r\n\r\n")
        .expect("写入垃圾字节");
    assert!(wait_until(|| recorder.count("try_connect") == 1));

    let mut rest = Vec::new();
    let outcome = client.read_to_end(&mut rest);
    assert!(
        !matches!(&outcome, Err(err) if err.kind() == std::io::ErrorKind::WouldBlock
            || err.kind() == std::io::ErrorKind::TimedOut),
        "握手失败后服务器应关闭连接"
    );
    assert_eq!(recorder.count("connect"), 0);
    assert_eq!(server.handle().sessions(), 0);
    server.close();
}

#[test]
fn close_cancels_pending_handshakes() {
    let identity = identity();
    let recorder = Recorder::new();
    let server = open_tls(&identity, quick_config(), MuxFlavor::Readiness, &recorder);

    // 沉默的客户端让握手线程停在等待中。
    let silent = TcpStream::connect(server.local_addr()).expect("连接服务器");
    assert!(wait_until(|| recorder.count("try_connect") == 1));
    let started = std::time::Instant::now();
    server.close();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "关闭不应等待握手预算耗尽"
    );
    assert_eq!(recorder.count("connect"), 0);
    drop(silent);
}
