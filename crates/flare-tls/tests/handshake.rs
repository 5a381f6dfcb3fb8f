//! 握手引擎集成测试
//!
//! - **Why**：握手引擎的价值在于“有界”与“分步”：任何对端行为都不能让握手无限挂起，
//!   读写子步骤必须能被事件循环单独驱动。
//! - **How**：rcgen 生成自签证书，真实回环 TCP 连接上运行 rustls 双端；沉默对端、
//!   中途断开、垃圾字节三类异常对端分别验证错误码。
//! - **What**：所有断言只依赖公开 API，不读取私有状态。

use std::{
    io::Write,
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use flare_core::{ErrorCode, Transfer};
use flare_tls::{
    EngineFlags, HandshakeEngine, HandshakeOptions, HotTlsConfig, ReadSteps, RustlsChannel,
    SendSteps, pem,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};

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

fn hot_config(identity: &Identity) -> HotTlsConfig {
    let config = pem::server_config(vec![identity.cert.clone()], identity.key.clone_key())
        .expect("构造服务端配置");
    HotTlsConfig::from_config(config)
}

fn client_channel(identity: &Identity) -> RustlsChannel {
    let config = pem::client_config(std::slice::from_ref(&identity.cert)).expect("客户端配置");
    let name = ServerName::try_from("localhost").expect("服务器名");
    let conn = rustls::ClientConnection::new(Arc::new(config), name).expect("客户端连接");
    RustlsChannel::client(conn)
}

fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("绑定回环监听");
    let client = TcpStream::connect(listener.local_addr().expect("地址")).expect("连接");
    let (server, _) = listener.accept().expect("受理");
    (client, server)
}

fn quick_options() -> HandshakeOptions {
    HandshakeOptions {
        max_attempts: 3,
        attempt_timeout: Duration::from_millis(20),
        cancel: None,
    }
}

fn read_until_complete(engine: &mut HandshakeEngine<RustlsChannel>, buf: &mut [u8]) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match engine.read(buf, ReadSteps::ALL).expect("读取不应失败") {
            Transfer::Complete(n) if n > 0 => return n,
            _ => thread::sleep(Duration::from_millis(5)),
        }
    }
    panic!("限定时间内未读到明文");
}

#[test]
fn tls_round_trip_over_loopback() {
    let identity = identity();
    let config = hot_config(&identity);
    let (client_sock, server_sock) = tcp_pair();

    let server = thread::spawn(move || {
        let channel = config.server_channel().expect("服务端连接对象");
        let mut engine =
            HandshakeEngine::open(server_sock, channel, EngineFlags::default()).expect("打开引擎");
        engine.accept(&HandshakeOptions::default()).expect("服务端握手");
        assert!(!engine.is_handshaking());

        let mut buf = [0u8; 64];
        let n = read_until_complete(&mut engine, &mut buf);
        assert_eq!(&buf[..n], b"hello");
        let sent = engine.send(b"world", SendSteps::ALL).expect("回写");
        assert_eq!(sent, Transfer::Complete(5));
        engine
    });

    let mut client = HandshakeEngine::open(client_sock, client_channel(&identity), EngineFlags::default())
        .expect("打开客户端引擎");
    client.connect(&HandshakeOptions::default()).expect("客户端握手");
    client.send(b"hello", SendSteps::ALL).expect("发送");

    let mut buf = [0u8; 64];
    let n = read_until_complete(&mut client, &mut buf);
    assert_eq!(&buf[..n], b"world");

    let mut server_engine = server.join().expect("服务端线程不应 panic");
    assert!(server_engine.close().is_none(), "close_on_destroy 时套接字随引擎关闭");
    assert!(server_engine.close().is_none(), "重复关闭为空操作");
    assert!(server_engine.is_closed());

    let err = server_engine
        .read(&mut buf, ReadSteps::ALL)
        .expect_err("关闭后的引擎不可再读");
    assert_eq!(err.code(), ErrorCode::InvalidContext);
}

#[test]
fn silent_peer_exhausts_the_attempt_budget() {
    let identity = identity();
    let config = hot_config(&identity);
    let (_client_sock, server_sock) = tcp_pair();

    let channel = config.server_channel().expect("服务端连接对象");
    let mut engine =
        HandshakeEngine::open(server_sock, channel, EngineFlags::default()).expect("打开引擎");
    let started = Instant::now();
    let err = engine.accept(&quick_options()).expect_err("沉默对端必须导致握手失败");
    assert_eq!(err.code(), ErrorCode::ErrorHandshake);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "握手循环必须在预算内终止"
    );
}

#[test]
fn silent_server_fails_the_connect_direction() {
    let identity = identity();
    let (client_sock, _server_sock) = tcp_pair();
    let mut engine =
        HandshakeEngine::open(client_sock, client_channel(&identity), EngineFlags::default())
            .expect("打开引擎");
    let err = engine.connect(&quick_options()).expect_err("对端不应答必须失败");
    assert_eq!(err.code(), ErrorCode::ErrorConnect);
}

#[test]
fn peer_closing_mid_handshake_reports_disconnect() {
    let identity = identity();
    let config = hot_config(&identity);
    let (client_sock, server_sock) = tcp_pair();
    drop(client_sock);

    let channel = config.server_channel().expect("服务端连接对象");
    let mut engine =
        HandshakeEngine::open(server_sock, channel, EngineFlags::default()).expect("打开引擎");
    let err = engine.accept(&quick_options()).expect_err("对端关闭必须失败");
    assert_eq!(err.code(), ErrorCode::Disconnect);
}

#[test]
fn garbage_from_peer_is_a_handshake_error() {
    let identity = identity();
    let config = hot_config(&identity);
    let (mut client_sock, server_sock) = tcp_pair();
    client_sock
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .expect("写入垃圾字节");

    let channel = config.server_channel().expect("服务端连接对象");
    let mut engine =
        HandshakeEngine::open(server_sock, channel, EngineFlags::default()).expect("打开引擎");
    let err = engine.accept(&quick_options()).expect_err("非 TLS 字节必须失败");
    assert_eq!(err.code(), ErrorCode::ErrorHandshake);
}

#[test]
fn raised_cancel_flag_aborts_the_handshake() {
    let identity = identity();
    let config = hot_config(&identity);
    let (_client_sock, server_sock) = tcp_pair();
    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Release);

    let channel = config.server_channel().expect("服务端连接对象");
    let mut engine =
        HandshakeEngine::open(server_sock, channel, EngineFlags::default()).expect("打开引擎");
    let err = engine
        .accept(&HandshakeOptions::default().with_cancel(cancel))
        .expect_err("取消标志必须中止握手");
    assert_eq!(err.code(), ErrorCode::Canceled);
}

#[test]
fn unconnected_socket_is_an_invalid_parameter() {
    let identity = identity();
    let config = hot_config(&identity);
    let raw = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)
        .expect("创建套接字");
    let stream = TcpStream::from(raw);

    let channel = config.server_channel().expect("服务端连接对象");
    let err = HandshakeEngine::open(stream, channel, EngineFlags::default())
        .expect_err("未连接的套接字必须被拒绝");
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
}

#[test]
fn close_hands_back_the_socket_when_asked() {
    let identity = identity();
    let config = hot_config(&identity);
    let (_client_sock, server_sock) = tcp_pair();
    let expected = server_sock.local_addr().expect("地址");

    let flags = EngineFlags {
        nonblocking: true,
        close_on_destroy: false,
    };
    let channel = config.server_channel().expect("服务端连接对象");
    let mut engine = HandshakeEngine::open(server_sock, channel, flags).expect("打开引擎");
    let socket = engine.close().expect("未要求关闭套接字时应交还");
    assert_eq!(socket.local_addr().expect("交还的套接字仍然有效"), expected);
    assert!(engine.close().is_none());
}

#[test]
fn hot_reload_swaps_the_snapshot() {
    let first = identity();
    let second = identity();
    let hot = hot_config(&first);
    let before = hot.snapshot();
    let next = pem::server_config(vec![second.cert.clone()], second.key.clone_key())
        .expect("第二份配置");
    let previous = hot.replace(Arc::new(next));
    assert!(Arc::ptr_eq(&before, &previous), "replace 返回被替换的旧快照");
    assert!(!Arc::ptr_eq(&before, &hot.snapshot()), "后续握手读取新快照");
}
